use crate::contactor::ContactorId;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const MAX_DIAG_CHANNELS: usize = 16;
const MAX_DIAG_HISTORY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagEvent {
    Ok,
    Nok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagChannel {
    /// Sensed feedback versus last commanded set value.
    ContactorFeedback(ContactorId),
    /// Contactor opened while current flowed above the switch-off limit.
    ContactorSwitchOff(ContactorId),
    FuseNormal,
    FuseCharge,
    DeepDischarge,
}

/// Receiver of pass/fail events from the contactor machine and the codec.
pub trait DiagReporter {
    fn report(&mut self, channel: DiagChannel, event: DiagEvent, timestamp_ms: u32);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel: DiagChannel,
    pub last_event: DiagEvent,
    pub last_timestamp_ms: u32,
    pub nok_count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiagTransition {
    pub channel: DiagChannel,
    pub event: DiagEvent,
    pub timestamp_ms: u32,
}

/// Keeps the latest event per channel and a bounded history of changes.
#[derive(Debug, Default)]
pub struct DiagRecorder {
    channels: Vec<ChannelRecord, MAX_DIAG_CHANNELS>,
    history: Vec<DiagTransition, MAX_DIAG_HISTORY>,
}

impl DiagRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_event(&self, channel: DiagChannel) -> Option<DiagEvent> {
        self.record(channel).map(|r| r.last_event)
    }

    pub fn nok_count(&self, channel: DiagChannel) -> u32 {
        self.record(channel).map_or(0, |r| r.nok_count)
    }

    pub fn record(&self, channel: DiagChannel) -> Option<&ChannelRecord> {
        self.channels.iter().find(|r| r.channel == channel)
    }

    pub fn channels(&self) -> &[ChannelRecord] {
        &self.channels
    }

    pub fn history(&self) -> &[DiagTransition] {
        &self.history
    }

    pub fn failing_channels(&self) -> impl Iterator<Item = &ChannelRecord> {
        self.channels.iter().filter(|r| r.last_event == DiagEvent::Nok)
    }

    fn push_transition(&mut self, transition: DiagTransition) {
        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(transition);
    }
}

impl DiagReporter for DiagRecorder {
    fn report(&mut self, channel: DiagChannel, event: DiagEvent, timestamp_ms: u32) {
        let nok = u32::from(event == DiagEvent::Nok);

        let previous = match self.channels.iter_mut().find(|r| r.channel == channel) {
            Some(existing) => {
                let previous = existing.last_event;
                existing.last_event = event;
                existing.last_timestamp_ms = timestamp_ms;
                existing.nok_count = existing.nok_count.saturating_add(nok);
                Some(previous)
            }
            None => {
                let record = ChannelRecord {
                    channel,
                    last_event: event,
                    last_timestamp_ms: timestamp_ms,
                    nok_count: nok,
                };
                if self.channels.push(record).is_err() {
                    warn!(?channel, "diagnostic channel table full, event dropped");
                    return;
                }
                None
            }
        };

        if previous == Some(event) || (previous.is_none() && event == DiagEvent::Ok) {
            return;
        }

        match event {
            DiagEvent::Nok => warn!(?channel, timestamp_ms, "diagnostic NOK"),
            DiagEvent::Ok => info!(?channel, timestamp_ms, "diagnostic recovered"),
        }
        self.push_transition(DiagTransition {
            channel,
            event,
            timestamp_ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_events_only_log_transitions() {
        let mut recorder = DiagRecorder::new();
        let channel = DiagChannel::ContactorFeedback(ContactorId::MainPlus);

        recorder.report(channel, DiagEvent::Ok, 1);
        recorder.report(channel, DiagEvent::Ok, 2);
        recorder.report(channel, DiagEvent::Nok, 3);
        recorder.report(channel, DiagEvent::Nok, 4);
        recorder.report(channel, DiagEvent::Ok, 5);

        assert_eq!(recorder.last_event(channel), Some(DiagEvent::Ok));
        assert_eq!(recorder.nok_count(channel), 2);
        // OK -> NOK and NOK -> OK
        assert_eq!(recorder.history().len(), 2);
        assert_eq!(recorder.history()[0].timestamp_ms, 3);
    }

    #[test]
    fn test_unknown_channel_has_no_record() {
        let recorder = DiagRecorder::new();
        assert_eq!(recorder.last_event(DiagChannel::FuseNormal), None);
        assert_eq!(recorder.nok_count(DiagChannel::FuseNormal), 0);
        assert_eq!(recorder.failing_channels().count(), 0);
    }
}
