use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;

use peerlane_codec::OutboundEnvelope;
use peerlane_compress::ActorRefPath;
use peerlane_core::{OutboundQueue, Wakeup};

use crate::settings::LaneSettings;

/// Identifies one outbound queue of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneId {
    Control,
    Large,
    Ordinary(usize),
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneId::Control => f.write_str("control"),
            LaneId::Large => f.write_str("large"),
            LaneId::Ordinary(index) => write!(f, "ordinary-{index}"),
        }
    }
}

/// Why an outbound envelope was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    QueueFull(LaneId),
    Quarantined,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::QueueFull(lane) => write!(f, "{lane} queue full"),
            DropReason::Quarantined => f.write_str("remote is quarantined"),
        }
    }
}

/// An envelope handed back to the sender instead of being queued.
#[derive(Debug)]
pub struct Dropped {
    pub reason: DropReason,
    pub envelope: OutboundEnvelope,
}

/// Recipient path patterns routed to the large-message lane.
///
/// Patterns are matched element by element: `*` matches any single element,
/// a trailing `**` matches any remainder (including none).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LargeMessageDestinations {
    patterns: Vec<Vec<String>>,
}

impl LargeMessageDestinations {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                pattern
                    .as_ref()
                    .split('/')
                    .filter(|element| !element.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, path: &ActorRefPath) -> bool {
        let elements: Vec<&str> = path.elements().collect();
        self.patterns
            .iter()
            .any(|pattern| pattern_matches(pattern, &elements))
    }
}

fn pattern_matches(pattern: &[String], elements: &[&str]) -> bool {
    match pattern.split_first() {
        None => elements.is_empty(),
        Some((head, rest)) if head == "**" && rest.is_empty() => true,
        Some((head, rest)) => match elements.split_first() {
            Some((element, remaining)) => {
                (head == "*" || head == element) && pattern_matches(rest, remaining)
            }
            None => false,
        },
    }
}

/// The outbound queues of one association.
///
/// Envelopes are routed by recipient: large-message destinations go to the
/// large lane, everything else to an ordinary lane picked by hashing the
/// recipient path, so one recipient always sees its messages in order.
pub struct OutboundLanes {
    control: OutboundQueue<OutboundEnvelope>,
    large: OutboundQueue<OutboundEnvelope>,
    ordinary: Vec<OutboundQueue<OutboundEnvelope>>,
    large_destinations: LargeMessageDestinations,
}

impl OutboundLanes {
    /// Build the lanes; `wakeup` supplies the consumer wakeup for each lane.
    pub fn new<F>(settings: &LaneSettings, mut wakeup: F) -> Self
    where
        F: FnMut(LaneId) -> Wakeup,
    {
        let capacity = |size: usize| NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        let control = OutboundQueue::new(
            capacity(settings.outbound_control_queue_size),
            wakeup(LaneId::Control),
        );
        let large = OutboundQueue::new(
            capacity(settings.outbound_large_message_queue_size),
            wakeup(LaneId::Large),
        );
        let ordinary = (0..settings.outbound_lanes.max(1))
            .map(|index| {
                OutboundQueue::new(
                    capacity(settings.outbound_message_queue_size),
                    wakeup(LaneId::Ordinary(index)),
                )
            })
            .collect();

        Self {
            control,
            large,
            ordinary,
            large_destinations: LargeMessageDestinations::new(
                &settings.large_message_destinations,
            ),
        }
    }

    pub fn ordinary_lanes(&self) -> usize {
        self.ordinary.len()
    }

    /// All lane ids, control first.
    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> + '_ {
        [LaneId::Control, LaneId::Large]
            .into_iter()
            .chain((0..self.ordinary.len()).map(LaneId::Ordinary))
    }

    /// The lane a user envelope is routed to.
    pub fn lane_for(&self, envelope: &OutboundEnvelope) -> LaneId {
        let Some(recipient) = &envelope.recipient else {
            return LaneId::Ordinary(0);
        };
        if self.large_destinations.matches(recipient) {
            return LaneId::Large;
        }
        if self.ordinary.len() == 1 {
            return LaneId::Ordinary(0);
        }
        let mut hasher = DefaultHasher::new();
        recipient.hash(&mut hasher);
        // The modulo keeps the value below `ordinary.len()`.
        LaneId::Ordinary((hasher.finish() % self.ordinary.len() as u64) as usize)
    }

    /// The queue behind `lane`. Out-of-range ordinary indices map to lane 0.
    pub fn queue(&self, lane: LaneId) -> &OutboundQueue<OutboundEnvelope> {
        match lane {
            LaneId::Control => &self.control,
            LaneId::Large => &self.large,
            LaneId::Ordinary(index) => self.ordinary.get(index).unwrap_or(&self.ordinary[0]),
        }
    }

    pub fn offer(&self, lane: LaneId, envelope: OutboundEnvelope) -> Result<(), OutboundEnvelope> {
        self.queue(lane).offer(envelope)
    }

    pub fn poll(&self, lane: LaneId) -> Option<OutboundEnvelope> {
        self.queue(lane).poll()
    }

    /// Envelopes waiting across all lanes.
    pub fn pending(&self) -> usize {
        self.lane_ids().map(|lane| self.queue(lane).len()).sum()
    }
}

impl fmt::Debug for OutboundLanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundLanes")
            .field("control", &self.control.len())
            .field("large", &self.large.len())
            .field(
                "ordinary",
                &self.ordinary.iter().map(OutboundQueue::len).collect::<Vec<_>>(),
            )
            .finish()
    }
}
