use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use super::*;
use crate::event::Subscription;

const MAX_FUTURE_SECONDS: u32 = i32::MAX as u32;

struct Trigger {
    /// `None` streams until cancelled
    expires_at: Option<Timestamp>,
}

#[derive(Default)]
struct CacheState {
    samples: VecDeque<GnssPosition>,
    triggers: BTreeMap<PosTriggerId, Trigger>,
    next_id: PosTriggerId,
    last_intake: Option<Timestamp>,
    interrupted: bool,
}

impl CacheState {
    fn now(&self) -> Timestamp {
        self.last_intake.unwrap_or(0)
    }
}

/// Caches recent GNSS positions and serves windowed requests.
///
/// Time is taken from sample timestamps, so requests are relative to the last
/// sample received.
pub struct PosDataCache {
    config: PositioningConfig,
    state: Mutex<CacheState>,
    events: PosDataEvents,
}

impl PosDataCache {
    pub fn new(config: PositioningConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
            events: PosDataEvents::default(),
        }
    }

    /// Feeds the cache from a positioning service.
    pub fn attach(self: &Arc<Self>, source: &PositioningEvents) -> Subscription {
        let weak: Weak<Self> = Arc::downgrade(self);
        source.gnss_position_update.subscribe(move |position: &GnssPosition| {
            if let Some(cache) = weak.upgrade() {
                cache.ingest(*position);
            }
        })
    }

    pub fn ingest(&self, position: GnssPosition) {
        let window_ms = u64::from(self.config.cache_window_s) * 1000;
        let (resumed, live) = match self.state.lock() {
            Ok(mut state) => {
                let now = position.timestamp;
                let resumed = std::mem::replace(&mut state.interrupted, false);
                state.last_intake = Some(now);
                state.samples.push_back(position);
                while state
                    .samples
                    .front()
                    .is_some_and(|s| now.saturating_sub(s.timestamp) > window_ms)
                {
                    state.samples.pop_front();
                }
                state
                    .triggers
                    .retain(|_, t| t.expires_at.map_or(true, |end| now <= end));
                let live: Vec<PosTriggerId> = state.triggers.keys().copied().collect();
                (resumed, live)
            }
            Err(_) => return,
        };
        if resumed {
            debug!("position intake resumed");
            self.events.data_intake_resumed.notify(&());
        }
        for trigger_id in live {
            self.events.live_data_deliver.notify(&GnssPayload {
                trigger_id,
                data: position,
            });
        }
    }

    /// Raises `data_intake_interrupted` once samples stop for longer than the timeout.
    pub fn check_intake(&self, now: Timestamp) -> bool {
        let interrupted = match self.state.lock() {
            Ok(mut state) => {
                let stale = state
                    .last_intake
                    .is_some_and(|last| now.saturating_sub(last) > self.config.intake_timeout_ms);
                if stale && !state.interrupted {
                    state.interrupted = true;
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        };
        if interrupted {
            warn!(now, "position intake interrupted");
            self.events.data_intake_interrupted.notify(&());
        }
        interrupted
    }

    pub fn active_triggers(&self) -> usize {
        self.state.lock().map(|s| s.triggers.len()).unwrap_or(0)
    }
}

impl PosDataProvider for PosDataCache {
    fn pos_data_request(
        &self,
        past_s: u32,
        future_s: u32,
    ) -> std::result::Result<PosTriggerId, PositioningError> {
        if past_s > MAX_PAST_SECONDS || future_s > MAX_FUTURE_SECONDS {
            return Err(PositioningError::InvalidArgument);
        }
        let (id, cached) = {
            let mut state = self.state.lock().map_err(|_| PositioningError::Unavailable)?;
            state.next_id = state.next_id.wrapping_add(1);
            let id = state.next_id;
            let now = state.now();
            let expires_at =
                (future_s != 0).then(|| now.saturating_add(u64::from(future_s) * 1000));
            state.triggers.insert(id, Trigger { expires_at });
            let cached: Vec<GnssPosition> = if past_s == 0 {
                Vec::new()
            } else {
                let since = now.saturating_sub(u64::from(past_s) * 1000);
                state
                    .samples
                    .iter()
                    .filter(|s| s.timestamp >= since)
                    .copied()
                    .collect()
            };
            (id, cached)
        };
        debug!(id, past_s, future_s, cached = cached.len(), "position request");
        for data in cached {
            self.events
                .cached_data_deliver
                .notify(&GnssPayload { trigger_id: id, data });
        }
        Ok(id)
    }

    fn cancel(&self, id: PosTriggerId) -> bool {
        self.state
            .lock()
            .map(|mut state| state.triggers.remove(&id).is_some())
            .unwrap_or(false)
    }

    fn events(&self) -> &PosDataEvents {
        &self.events
    }
}
