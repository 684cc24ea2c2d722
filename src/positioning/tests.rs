use super::*;
use crate::event::{Event, Subscription};
use std::sync::{Arc, Mutex};

fn record<T: Clone + Send + 'static>(event: &Event<T>) -> (Arc<Mutex<Vec<T>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = event.subscribe(move |v: &T| sink.lock().unwrap().push(v.clone()));
    (seen, sub)
}

fn create_gnss(timestamp: Timestamp, fix_status: GnssFixStatus) -> GnssPosition {
    GnssPosition {
        timestamp,
        latitude: 48.85,
        longitude: 2.35,
        fix_status,
        validity: GnssPositionValidity::LATITUDE
            | GnssPositionValidity::LONGITUDE
            | GnssPositionValidity::FIX_STATUS,
        ..GnssPosition::default()
    }
}

fn create_enhanced(timestamp: Timestamp, latitude: f64, longitude: f64) -> EnhancedPosition {
    EnhancedPosition {
        timestamp,
        latitude,
        longitude,
        dr_info: DeadReckoningInfo {
            status: DeadReckoningStatus::Calibrated,
            quality: 80,
        },
        fix_type: EnhancedPositionFixType::GnssDr,
        validity: EnhancedValidity::HPOS | EnhancedValidity::DR_INFO | EnhancedValidity::FIX_TYPE,
        ..EnhancedPosition::default()
    }
}

mod hub_tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_latitude() {
        let meters = hub::haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((meters - 111_195.0).abs() < 10.0);
    }

    #[test]
    fn test_time_to_first_fix() {
        let hub = PositioningHub::new(PositioningConfig::default());
        assert_eq!(hub.time_to_first_fix(), 0);

        hub.publish_gnss_position(create_gnss(10_000, GnssFixStatus::NoFix));
        hub.publish_gnss_position(create_gnss(14_000, GnssFixStatus::Fix2D));
        assert_eq!(hub.time_to_first_fix(), 0);

        hub.publish_gnss_position(create_gnss(42_500, GnssFixStatus::Fix3D));
        assert_eq!(hub.time_to_first_fix(), 32);

        hub.publish_gnss_position(create_gnss(90_000, GnssFixStatus::NoFix));
        hub.publish_gnss_position(create_gnss(99_000, GnssFixStatus::Fix3D));
        assert_eq!(hub.time_to_first_fix(), 32);
    }

    #[test]
    fn test_last_valid_position_survives_fix_loss() {
        let hub = PositioningHub::new(PositioningConfig::default());
        assert_eq!(hub.last_valid_gnss_position().fix_status, GnssFixStatus::NoFix);

        hub.publish_gnss_position(create_gnss(1_000, GnssFixStatus::Fix3D));
        hub.publish_gnss_position(create_gnss(2_000, GnssFixStatus::NoFix));

        assert_eq!(hub.gnss_position().fix_status, GnssFixStatus::NoFix);
        let last = hub.last_valid_gnss_position();
        assert_eq!(last.fix_status, GnssFixStatus::Fix3D);
        assert_eq!(last.timestamp, 1_000);
    }

    #[test]
    fn test_getter_sees_notified_value() {
        let hub = Arc::new(PositioningHub::new(PositioningConfig::default()));
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (sink, weak) = (observed.clone(), Arc::downgrade(&hub));
        let _sub = hub.events().gnss_position_update.subscribe(move |_: &GnssPosition| {
            if let Some(hub) = weak.upgrade() {
                sink.lock().unwrap().push(hub.gnss_position().timestamp);
            }
        });

        hub.publish_gnss_position(create_gnss(7_000, GnssFixStatus::Fix2D));
        assert_eq!(*observed.lock().unwrap(), vec![7_000]);
    }

    #[test]
    fn test_satellites_and_time() {
        let hub = PositioningHub::new(PositioningConfig::default());
        let (times, _sub) = record(&hub.events().gnss_time_update);
        let time = GnssTime {
            timestamp: 5,
            year: 2024,
            month: 2,
            day: 29,
            validity: GnssTimeValidity::DATE,
            ..GnssTime::default()
        };
        hub.publish_gnss_time(time);
        hub.publish_satellite_details(vec![SatelliteDetail {
            system: GnssSystem::GALILEO,
            satellite_id: 11,
            status: SatelliteStatus::USED,
            ..SatelliteDetail::default()
        }]);

        assert_eq!(hub.gnss_time(), time);
        assert_eq!(*times.lock().unwrap(), vec![time]);
        assert_eq!(hub.satellite_details()[0].satellite_id, 11);
    }

    #[test]
    fn test_last_valid_enhanced_requires_calibration() {
        let hub = PositioningHub::new(PositioningConfig::default());
        let mut uncalibrated = create_enhanced(1_000, 45.0, 7.0);
        uncalibrated.dr_info.status = DeadReckoningStatus::Calibrating;

        hub.publish_enhanced_position(uncalibrated);
        assert_eq!(hub.enhanced_position(), uncalibrated);
        assert_eq!(
            hub.last_valid_enhanced_position().fix_type,
            EnhancedPositionFixType::None
        );

        let calibrated = create_enhanced(2_000, 45.0, 7.0);
        hub.publish_enhanced_position(calibrated);
        hub.publish_enhanced_position(uncalibrated);
        assert_eq!(hub.last_valid_enhanced_position(), calibrated);
    }

    #[test]
    fn test_trip_distance_accumulates_and_resets() {
        let hub = PositioningHub::new(PositioningConfig::default());
        let (distances, _sub) = record(&hub.events().traveled_distance_update);

        hub.publish_enhanced_position(create_enhanced(0, 0.0, 0.0));
        hub.publish_enhanced_position(create_enhanced(1_000, 0.001, 0.0));
        assert_eq!(hub.traveled_distance(), 0);
        assert!(distances.lock().unwrap().is_empty());

        hub.on_vehicle_status(EngineStatus::Running, SevStatus::Contact, 2_000);
        assert!(hub.trip_active());
        hub.publish_enhanced_position(create_enhanced(3_000, 0.0, 0.0));
        hub.publish_enhanced_position(create_enhanced(4_000, 0.001, 0.0));
        hub.publish_enhanced_position(create_enhanced(5_000, 0.002, 0.0));

        let travelled = hub.traveled_distance();
        assert!((221..=223).contains(&travelled), "{travelled}");
        assert_eq!(distances.lock().unwrap()[0], 0);
        assert_eq!(distances.lock().unwrap().last(), Some(&travelled));
    }

    #[test]
    fn test_trip_ends_after_engine_off_delay() {
        let hub = PositioningHub::new(PositioningConfig::default());
        hub.on_vehicle_status(EngineStatus::Running, SevStatus::Contact, 0);
        hub.on_vehicle_status(EngineStatus::NotRunning, SevStatus::Contact, 1_000);
        hub.on_vehicle_status(EngineStatus::NotRunning, SevStatus::Contact, 10_000);
        assert!(hub.trip_active());

        hub.on_vehicle_status(EngineStatus::NotRunning, SevStatus::Stop, 11_001);
        assert!(!hub.trip_active());
    }

    #[test]
    fn test_engine_restart_keeps_trip() {
        let hub = PositioningHub::new(PositioningConfig::default());
        hub.on_vehicle_status(EngineStatus::Running, SevStatus::Contact, 0);
        hub.publish_enhanced_position(create_enhanced(500, 0.0, 0.0));
        hub.publish_enhanced_position(create_enhanced(1_000, 0.001, 0.0));
        hub.on_vehicle_status(EngineStatus::NotRunning, SevStatus::Contact, 2_000);
        hub.on_vehicle_status(EngineStatus::Running, SevStatus::Contact, 5_000);
        hub.on_vehicle_status(EngineStatus::Running, SevStatus::Contact, 20_000);

        assert!(hub.trip_active());
        assert!(hub.traveled_distance() > 100);
    }
}

mod provider_tests {
    use super::*;

    #[test]
    fn test_request_window_limits() {
        let cache = PosDataCache::new(PositioningConfig::default());
        assert_eq!(
            cache.pos_data_request(MAX_PAST_SECONDS + 1, 0),
            Err(PositioningError::InvalidArgument)
        );
        assert_eq!(
            cache.pos_data_request(0, i32::MAX as u32 + 1),
            Err(PositioningError::InvalidArgument)
        );
        assert!(cache.pos_data_request(MAX_PAST_SECONDS, 0).is_ok());
    }

    #[test]
    fn test_cached_samples_within_past_window() {
        let cache = PosDataCache::new(PositioningConfig::default());
        for ts in [0, 100_000, 110_000, 125_000] {
            cache.ingest(create_gnss(ts, GnssFixStatus::Fix3D));
        }
        let (cached, _sub) = record(&cache.events().cached_data_deliver);

        let id = cache.pos_data_request(20, 0).unwrap();
        let stamps: Vec<_> = cached.lock().unwrap().iter().map(|p| p.data.timestamp).collect();
        assert_eq!(stamps, vec![110_000, 125_000]);
        assert!(cached.lock().unwrap().iter().all(|p| p.trigger_id == id));
    }

    #[test]
    fn test_cache_evicts_outside_window() {
        let cache = PosDataCache::new(PositioningConfig::default());
        cache.ingest(create_gnss(0, GnssFixStatus::Fix3D));
        cache.ingest(create_gnss(121_000, GnssFixStatus::Fix3D));
        let (cached, _sub) = record(&cache.events().cached_data_deliver);

        cache.pos_data_request(MAX_PAST_SECONDS, 0).unwrap();
        assert_eq!(cached.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_longest_window_at_clock_limit() {
        let cache = PosDataCache::new(PositioningConfig::default());
        cache.ingest(create_gnss(u64::MAX - 1, GnssFixStatus::Fix3D));
        let (live, _sub) = record(&cache.events().live_data_deliver);

        let id = cache.pos_data_request(0, i32::MAX as u32).unwrap();
        cache.ingest(create_gnss(u64::MAX, GnssFixStatus::Fix3D));
        assert_eq!(live.lock().unwrap().len(), 1);
        assert_eq!(cache.active_triggers(), 1);
        assert!(cache.cancel(id));
    }

    #[test]
    fn test_live_delivery_until_expiry() {
        let cache = PosDataCache::new(PositioningConfig::default());
        cache.ingest(create_gnss(1_000, GnssFixStatus::Fix3D));
        let (live, _sub) = record(&cache.events().live_data_deliver);

        let id = cache.pos_data_request(0, 2).unwrap();
        cache.ingest(create_gnss(2_000, GnssFixStatus::Fix3D));
        cache.ingest(create_gnss(3_000, GnssFixStatus::Fix3D));
        cache.ingest(create_gnss(4_000, GnssFixStatus::Fix3D));

        let stamps: Vec<_> = live.lock().unwrap().iter().map(|p| p.data.timestamp).collect();
        assert_eq!(stamps, vec![2_000, 3_000]);
        assert!(!cache.cancel(id));
        assert_eq!(cache.active_triggers(), 0);
    }

    #[test]
    fn test_cancel_stops_streaming() {
        let cache = PosDataCache::new(PositioningConfig::default());
        let (live, _sub) = record(&cache.events().live_data_deliver);

        let id = cache.pos_data_request(0, 0).unwrap();
        cache.ingest(create_gnss(1_000, GnssFixStatus::Fix3D));
        assert!(cache.cancel(id));
        cache.ingest(create_gnss(2_000, GnssFixStatus::Fix3D));

        assert_eq!(live.lock().unwrap().len(), 1);
        assert!(!cache.cancel(id));
    }

    #[test]
    fn test_intake_interrupt_and_resume() {
        let cache = PosDataCache::new(PositioningConfig::default());
        let (interrupted, _a) = record(&cache.events().data_intake_interrupted);
        let (resumed, _b) = record(&cache.events().data_intake_resumed);

        assert!(!cache.check_intake(60_000));
        cache.ingest(create_gnss(1_000, GnssFixStatus::Fix3D));
        assert!(!cache.check_intake(3_500));
        assert!(cache.check_intake(4_500));
        assert!(!cache.check_intake(9_000));
        cache.ingest(create_gnss(9_500, GnssFixStatus::Fix3D));

        assert_eq!(interrupted.lock().unwrap().len(), 1);
        assert_eq!(resumed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_attach_follows_hub() {
        let hub = PositioningHub::new(PositioningConfig::default());
        let cache = Arc::new(PosDataCache::new(PositioningConfig::default()));
        let _feed = cache.attach(hub.events());
        let (live, _sub) = record(&cache.events().live_data_deliver);

        cache.pos_data_request(0, 0).unwrap();
        hub.publish_gnss_position(create_gnss(1_000, GnssFixStatus::Fix3D));
        assert_eq!(live.lock().unwrap().len(), 1);
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(PositioningConfig::default().validate().is_ok());
    }

    #[test]
    fn test_short_cache_window_rejected() {
        let config = PositioningConfig {
            cache_window_s: 30,
            ..PositioningConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
