use super::radio::*;
use super::xcall::*;
use crate::event::{Event, Subscription};
use crate::types::{RemoteCallable, Service};
use std::sync::{Arc, Mutex};

fn record<T: Clone + Send + 'static>(event: &Event<T>) -> (Arc<Mutex<Vec<T>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = event.subscribe(move |v: &T| sink.lock().unwrap().push(v.clone()));
    (seen, sub)
}

mod radio_tests {
    use super::*;

    #[test]
    fn test_getters_empty_until_reported() {
        let cache = BroadcastReceiverCache::new();
        assert!(cache.program_info().is_none());
        assert!(cache.available_bands().is_none());
        assert!(cache.announcement_info().is_none());
        assert!(cache.preset_list().is_none());
        assert!(cache.user_settings().is_none());
    }

    #[test]
    fn test_program_info_update() {
        let cache = BroadcastReceiverCache::new();
        let (seen, _sub) = record(&cache.events().program_info);
        let info = ProgramInfo {
            band: "FM".into(),
            program_name: "RADIO 1".into(),
            frequency: 98_500,
            ..ProgramInfo::default()
        };

        cache.update_program_info(info.clone());

        assert_eq!(cache.program_info().as_deref(), Some(&info));
        assert_eq!(*seen.lock().unwrap(), vec![info]);
    }

    #[test]
    fn test_snapshot_outlives_update() {
        let cache = BroadcastReceiverCache::new();
        cache.update_preset_list(PresetList {
            items: vec![PresetListItem {
                index: 1,
                ..PresetListItem::default()
            }],
            total_number: 1,
        });
        let before = cache.preset_list().unwrap();

        cache.update_preset_list(PresetList::default());

        assert_eq!(before.total_number, 1);
        assert_eq!(cache.preset_list().unwrap().total_number, 0);
    }

    #[test]
    fn test_each_type_has_its_channel() {
        let cache = BroadcastReceiverCache::new();
        let (bands, _a) = record(&cache.events().available_bands);
        let (settings, _b) = record(&cache.events().user_settings);
        let (announcements, _c) = record(&cache.events().announcement_info);

        cache.update_available_bands(vec![AvailableBand {
            band: "DAB".into(),
            band_range: BandRange {
                min: 174_928,
                max: 239_200,
                manual_step: 1,
                auto_step: 1,
            },
        }]);
        let mut user = UserSettings::default();
        user.capability_settings.af = true;
        cache.update_user_settings(user);

        assert_eq!(bands.lock().unwrap().len(), 1);
        assert_eq!(*settings.lock().unwrap(), vec![user]);
        assert!(announcements.lock().unwrap().is_empty());
        assert!(cache.user_settings().unwrap().capability_settings.af);
    }
}

mod xcall_tests {
    use super::*;

    #[test]
    fn test_idle_defaults() {
        let status = XcallStatus::new();
        assert_eq!(status.ecall_state(), EcallState::Idle);
        assert_eq!(status.ecall_button_state(), ButtonState::NotPressed);
        assert_eq!(status.last_ecall_description().reason, EcallReason::Unknown);
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(EcallState::Unknown as i32, -1);
        assert_eq!(EcallState::WaitingForCallback as i32, 2);
        assert_eq!(EcallReason::AutomaticTriggered as i32, 2);
        assert_eq!(ButtonState::Unavailable as i32, -1);
        assert_eq!(ButtonState::LongReleased as i32, 3);
    }

    #[test]
    fn test_ecall_lifecycle() {
        let status = XcallStatus::new();
        let (states, _sub) = record(&status.events().ecall_state_changed);

        status.start_ecall(EcallReason::ManualTriggered, 1_700_000_000, "VF3ABCDEF12345678");
        assert_eq!(status.ecall_reason(), EcallReason::ManualTriggered);
        status.await_callback();
        status.end_ecall();

        assert_eq!(
            *states.lock().unwrap(),
            vec![
                EcallState::OnGoing,
                EcallState::WaitingForCallback,
                EcallState::Idle
            ]
        );
        assert_eq!(status.ecall_reason(), EcallReason::NotTriggered);
        let last = status.last_ecall_description();
        assert_eq!(last.started_at, 1_700_000_000);
        assert_eq!(last.vin, "VF3ABCDEF12345678");
    }

    #[test]
    fn test_playback_refused_during_calls() {
        let status = XcallStatus::new();
        let (played, _sub) = record(&status.events().audio_playback);

        assert!(!status.play_audio_file(""));
        assert!(status.play_audio_file("/usr/share/sounds/chime.wav"));

        status.start_ecall(EcallReason::AutomaticTriggered, 0, "");
        assert!(!status.play_audio_file("/usr/share/sounds/chime.wav"));
        status.await_callback();
        assert!(!status.play_audio_file("/usr/share/sounds/chime.wav"));
        status.end_ecall();

        status.set_acall_active(true);
        assert!(!status.play_audio_file("/usr/share/sounds/chime.wav"));
        status.set_acall_active(false);

        assert_eq!(played.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_button_states() {
        let status = XcallStatus::new();
        status.set_button_state(CallButton::Acall, ButtonState::LongPressed);
        assert_eq!(status.acall_button_state(), ButtonState::LongPressed);
        assert_eq!(status.ecall_button_state(), ButtonState::NotPressed);
    }

    #[test]
    fn test_remote_endpoints() {
        let status = Arc::new(XcallStatus::new());
        let audio = status.audio_endpoint();
        let ecall = status.ecall_endpoint();

        assert_eq!(audio.service_name(), AUDIO_SERVICE_NAME);
        assert_eq!(ecall.service_name(), XCALL_SERVICE_NAME);
        assert_eq!(audio.endpoint().socket_addr().unwrap().port(), 835);
        assert_eq!(ecall.endpoint().socket_addr().unwrap().port(), 834);
        assert_eq!(ecall.endpoint().object, "PublicEcallRemoteObject");

        status.start_ecall(EcallReason::ManualTriggered, 5, "");
        assert_eq!(ecall.ecall_state(), EcallState::OnGoing);
        assert!(!audio.play_audio_file("beep.wav"));
    }
}
