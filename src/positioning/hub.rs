use std::sync::RwLock;

use tracing::{debug, info};

use super::*;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[derive(Default)]
struct Trip {
    active: bool,
    meters: f64,
    last_fix: Option<(f64, f64)>,
    engine_off_since: Option<Timestamp>,
}

#[derive(Default)]
struct HubState {
    gnss: GnssPosition,
    last_valid_gnss: GnssPosition,
    time: GnssTime,
    satellites: Vec<SatelliteDetail>,
    first_sample_at: Option<Timestamp>,
    ttff_s: u32,
    enhanced: EnhancedPosition,
    last_valid_enhanced: EnhancedPosition,
    engine: EngineStatus,
    sev: SevStatus,
    trip: Trip,
}

/// Latest positioning data with trip distance accounting.
///
/// Values are swapped in before the matching event is published, so a getter
/// called from a callback sees at least the notified value.
pub struct PositioningHub {
    config: PositioningConfig,
    state: RwLock<HubState>,
    events: PositioningEvents,
}

impl PositioningHub {
    pub fn new(config: PositioningConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HubState::default()),
            events: PositioningEvents::default(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&HubState) -> T) -> T
    where
        T: Default,
    {
        self.state.read().map(|state| f(&state)).unwrap_or_default()
    }

    pub fn publish_gnss_position(&self, position: GnssPosition) {
        if let Ok(mut state) = self.state.write() {
            let first = *state.first_sample_at.get_or_insert(position.timestamp);
            if position.fix_status == GnssFixStatus::Fix3D {
                if state.last_valid_gnss.fix_status != GnssFixStatus::Fix3D {
                    let elapsed_ms = position.timestamp.saturating_sub(first);
                    state.ttff_s = u32::try_from(elapsed_ms / 1000).unwrap_or(u32::MAX);
                    info!(ttff_s = state.ttff_s, "first 3D fix");
                }
                state.last_valid_gnss = position;
            }
            state.gnss = position;
        }
        self.events.gnss_position_update.notify(&position);
    }

    pub fn publish_gnss_time(&self, time: GnssTime) {
        if let Ok(mut state) = self.state.write() {
            state.time = time;
        }
        self.events.gnss_time_update.notify(&time);
    }

    pub fn publish_satellite_details(&self, satellites: Vec<SatelliteDetail>) {
        if let Ok(mut state) = self.state.write() {
            state.satellites = satellites.clone();
        }
        self.events.satellite_details_update.notify(&satellites);
    }

    pub fn publish_enhanced_position(&self, position: EnhancedPosition) {
        let distance = match self.state.write() {
            Ok(mut state) => {
                state.enhanced = position;
                if position.is_calibrated() {
                    state.last_valid_enhanced = position;
                }
                self.expire_trip(&mut state, position.timestamp);
                accumulate(&mut state.trip, &position)
            }
            Err(_) => None,
        };
        self.events.enhanced_position_update.notify(&position);
        if let Some(meters) = distance {
            self.events.traveled_distance_update.notify(&meters);
        }
    }

    /// Vehicle status feed driving trip start and end
    pub fn on_vehicle_status(&self, engine: EngineStatus, sev: SevStatus, now: Timestamp) {
        let reset = match self.state.write() {
            Ok(mut state) => {
                state.engine = engine;
                state.sev = sev;
                if engine == EngineStatus::Running {
                    state.trip.engine_off_since = None;
                    if sev == SevStatus::Contact && !state.trip.active {
                        state.trip = Trip {
                            active: true,
                            ..Trip::default()
                        };
                        info!(at = now, "trip started");
                        true
                    } else {
                        false
                    }
                } else {
                    if state.trip.active && state.trip.engine_off_since.is_none() {
                        state.trip.engine_off_since = Some(now);
                    }
                    self.expire_trip(&mut state, now);
                    false
                }
            }
            Err(_) => false,
        };
        if reset {
            self.events.traveled_distance_update.notify(&0);
        }
    }

    fn expire_trip(&self, state: &mut HubState, now: Timestamp) {
        if let Some(since) = state.trip.engine_off_since {
            if state.trip.active && now.saturating_sub(since) > self.config.trip_end_delay_ms {
                state.trip.active = false;
                state.trip.last_fix = None;
                info!(meters = state.trip.meters, "trip ended");
            }
        }
    }

    pub fn trip_active(&self) -> bool {
        self.read(|state| state.trip.active)
    }
}

/// Adds the leg to the previous fix; returns the new total when it changed.
fn accumulate(trip: &mut Trip, position: &EnhancedPosition) -> Option<u32> {
    if !trip.active || !position.validity.contains(EnhancedValidity::HPOS) {
        return None;
    }
    let here = (position.latitude, position.longitude);
    let previous = trip.last_fix.replace(here)?;
    let before = trip.meters as u32;
    trip.meters += haversine_m(previous.0, previous.1, here.0, here.1);
    debug!(meters = trip.meters, "trip distance");
    let after = trip.meters as u32;
    (after != before).then_some(after)
}

impl Service for PositioningHub {
    fn service_name(&self) -> &'static str {
        POSITIONING_SERVICE_NAME
    }
}

impl PositioningService for PositioningHub {
    fn gnss_position(&self) -> GnssPosition {
        self.read(|state| state.gnss)
    }

    fn last_valid_gnss_position(&self) -> GnssPosition {
        self.read(|state| state.last_valid_gnss)
    }

    fn gnss_time(&self) -> GnssTime {
        self.read(|state| state.time)
    }

    fn satellite_details(&self) -> Vec<SatelliteDetail> {
        self.read(|state| state.satellites.clone())
    }

    fn time_to_first_fix(&self) -> u32 {
        self.read(|state| state.ttff_s)
    }

    fn enhanced_position(&self) -> EnhancedPosition {
        self.read(|state| state.enhanced)
    }

    fn last_valid_enhanced_position(&self) -> EnhancedPosition {
        self.read(|state| state.last_valid_enhanced)
    }

    fn traveled_distance(&self) -> u32 {
        self.read(|state| state.trip.meters as u32)
    }

    fn events(&self) -> &PositioningEvents {
        &self.events
    }
}
