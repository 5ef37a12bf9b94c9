//! Shared transport clock
//!
//! One `Transport` per engine. It owns the musical time base (tempo, running
//! flag, position in seconds) and a queue of typed events scheduled against
//! that time base. The host drives it with `advance(dt)`; due events are
//! returned to the caller for dispatch instead of being run as callbacks, so
//! nothing scheduled can re-enter batch processing.
//!
//! Stopping clears the queue and bumps the session counter. An event that
//! carries an older session, or that is delivered while stopped, is stale and
//! is dropped with a desync warning.

use crate::error::ConfigError;
use crate::tone::VoiceHandle;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{info, warn};

pub const MIN_TEMPO_BPM: f64 = 20.0;
pub const MAX_TEMPO_BPM: f64 = 300.0;
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Work the engine performs when a scheduled time is reached.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Next drum/bass step; `generation` ties it to one run of the loop.
    RhythmStep { generation: u64 },
    /// Drain delay for a released voice has elapsed.
    DisposeVoice { identity: String, handle: VoiceHandle },
    /// Periodic staleness check.
    Sweep,
}

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// Transport time in seconds at which the event is due.
    pub time: f64,
    /// Tiebreak for events due at the same time; lower fires first.
    pub sequence: u64,
    /// Session the event was scheduled in.
    pub session: u64,
    pub event: TransportEvent,
}

// Min-heap on (time, sequence): BinaryHeap is a max-heap, so reverse.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time.total_cmp(&other.time) == Ordering::Equal && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
}

impl EventQueue {
    fn push(&mut self, time: f64, session: u64, event: TransportEvent) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            time,
            sequence,
            session,
            event,
        });
        sequence
    }

    fn pop_if_ready(&mut self, up_to: f64) -> Option<ScheduledEvent> {
        if self.heap.peek().is_some_and(|e| e.time <= up_to) {
            self.heap.pop()
        } else {
            None
        }
    }

    fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }
}

#[derive(Debug)]
pub struct Transport {
    tempo_bpm: f64,
    running: bool,
    position: f64,
    session: u64,
    queue: EventQueue,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO_BPM)
    }
}

impl Transport {
    /// A stopped transport at position 0. Tempo is clamped into range.
    pub fn new(tempo_bpm: f64) -> Self {
        Self {
            tempo_bpm: tempo_bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM),
            running: false,
            position: 0.0,
            session: 0,
            queue: EventQueue::default(),
        }
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!("Transport started at {:.1} BPM (session {})", self.tempo_bpm, self.session);
    }

    /// Stop, rewind to 0 and cancel everything pending.
    pub fn stop(&mut self) {
        let cancelled = self.queue.heap.len();
        self.queue.heap.clear();
        self.running = false;
        self.position = 0.0;
        self.session += 1;
        info!("Transport stopped ({} pending events cancelled)", cancelled);
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), ConfigError> {
        validate_tempo(bpm)?;
        self.tempo_bpm = bpm;
        info!("Tempo set to {:.1} BPM", bpm);
        Ok(())
    }

    pub fn tempo(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current transport time in seconds.
    pub fn now(&self) -> f64 {
        self.position
    }

    /// Current position in quarter-note beats.
    pub fn beats(&self) -> f64 {
        self.position * self.tempo_bpm / 60.0
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Queue `event` for `time`. Times in the past fire on the next advance.
    pub fn schedule_at(&mut self, time: f64, event: TransportEvent) -> u64 {
        self.queue.push(time, self.session, event)
    }

    pub fn schedule_in(&mut self, delay: f64, event: TransportEvent) -> u64 {
        self.schedule_at(self.position + delay.max(0.0), event)
    }

    /// Remove pending events matching `pred`; returns how many were removed.
    pub fn cancel_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&TransportEvent) -> bool,
    {
        let before = self.queue.heap.len();
        self.queue.heap.retain(|e| !pred(&e.event));
        before - self.queue.heap.len()
    }

    pub fn pending(&self) -> usize {
        self.queue.heap.len()
    }

    pub fn next_event_time(&self) -> Option<f64> {
        self.queue.peek_time()
    }

    /// Move time forward by `dt` seconds and return the events now due, in
    /// (time, sequence) order. A stopped transport does not move.
    pub fn advance(&mut self, dt: f64) -> Vec<ScheduledEvent> {
        if !self.running {
            return Vec::new();
        }
        if dt.is_finite() && dt > 0.0 {
            self.position += dt;
        }

        let mut due = Vec::new();
        while let Some(event) = self.queue.pop_if_ready(self.position) {
            if event.session == self.session {
                due.push(event);
            } else {
                warn!(
                    "Transport desync: dropping {:?} from session {} (current {})",
                    event.event, event.session, self.session
                );
            }
        }
        due
    }

    /// Whether a previously returned event may still be dispatched.
    pub fn accepts(&self, event: &ScheduledEvent) -> bool {
        if !self.running {
            warn!("Transport desync: {:?} delivered while stopped, discarding", event.event);
            return false;
        }
        if event.session != self.session {
            warn!(
                "Transport desync: {:?} from session {} (current {}), discarding",
                event.event, event.session, self.session
            );
            return false;
        }
        true
    }
}

pub fn validate_tempo(bpm: f64) -> Result<(), ConfigError> {
    if bpm.is_finite() && (MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&bpm) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTempo {
            bpm,
            min: MIN_TEMPO_BPM,
            max: MAX_TEMPO_BPM,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_transport_does_not_move() {
        let mut transport = Transport::default();
        transport.schedule_at(0.0, TransportEvent::Sweep);
        assert!(transport.advance(1.0).is_empty());
        assert_eq!(transport.now(), 0.0);
    }

    #[test]
    fn test_events_fire_in_time_order() {
        let mut transport = Transport::default();
        transport.start();
        transport.schedule_at(0.5, TransportEvent::RhythmStep { generation: 2 });
        transport.schedule_at(0.2, TransportEvent::RhythmStep { generation: 1 });
        transport.schedule_at(0.5, TransportEvent::Sweep);
        transport.schedule_at(2.0, TransportEvent::Sweep);

        let due = transport.advance(0.6);
        let events: Vec<_> = due.into_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                TransportEvent::RhythmStep { generation: 1 },
                TransportEvent::RhythmStep { generation: 2 },
                TransportEvent::Sweep,
            ]
        );
        assert_eq!(transport.pending(), 1);
        assert_eq!(transport.next_event_time(), Some(2.0));
    }

    #[test]
    fn test_stop_resets_and_cancels() {
        let mut transport = Transport::default();
        transport.start();
        transport.advance(3.0);
        transport.schedule_in(1.0, TransportEvent::Sweep);
        let session = transport.session();

        transport.stop();
        assert_eq!(transport.now(), 0.0);
        assert_eq!(transport.pending(), 0);
        assert_eq!(transport.session(), session + 1);

        transport.start();
        assert!(transport.advance(5.0).is_empty());
    }

    #[test]
    fn test_accepts_rejects_stale_events() {
        let mut transport = Transport::default();
        transport.start();
        transport.schedule_at(0.1, TransportEvent::Sweep);
        let due = transport.advance(0.2);
        assert_eq!(due.len(), 1);
        assert!(transport.accepts(&due[0]));

        transport.stop();
        assert!(!transport.accepts(&due[0]));
        transport.start();
        assert!(!transport.accepts(&due[0]));
    }

    #[test]
    fn test_tempo_range() {
        let mut transport = Transport::default();
        assert!(transport.set_tempo(19.0).is_err());
        assert!(transport.set_tempo(301.0).is_err());
        assert!(transport.set_tempo(f64::NAN).is_err());
        assert!(transport.set_tempo(90.0).is_ok());
        assert_eq!(transport.tempo(), 90.0);
        transport.start();
        transport.advance(2.0);
        assert!((transport.beats() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_cancel_where() {
        let mut transport = Transport::default();
        transport.schedule_at(1.0, TransportEvent::RhythmStep { generation: 0 });
        transport.schedule_at(1.0, TransportEvent::Sweep);
        let removed = transport.cancel_where(|e| matches!(e, TransportEvent::RhythmStep { .. }));
        assert_eq!(removed, 1);
        assert_eq!(transport.pending(), 1);
    }
}
