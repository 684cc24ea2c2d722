use super::diagnosis::*;
use super::remote_access::*;
use crate::event::{Event, Subscription};
use crate::mock::MockPort;
use crate::types::{Config, Frame};
use std::sync::{Arc, Mutex};

fn record<T: Clone + Send + 'static>(event: &Event<T>) -> (Arc<Mutex<Vec<T>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = event.subscribe(move |v: &T| sink.lock().unwrap().push(v.clone()));
    (seen, sub)
}

fn create_gateway(
    config: RemoteAccessConfig,
) -> (RemoteAccessGateway<MockPort>, Arc<Mutex<Vec<Frame>>>) {
    let port = MockPort::new_recording();
    let sent = port.sent();
    (RemoteAccessGateway::new(config, port).unwrap(), sent)
}

mod diagnosis_tests {
    use super::*;

    #[test]
    fn test_unknown_dtc_not_available() {
        let table = DtcTable::new();
        assert_eq!(table.query_dtc_status(0x00C123), Ok(DtcStatus::NotAvailable));
    }

    #[test]
    fn test_code_must_fit_three_bytes() {
        let table = DtcTable::new();
        assert_eq!(table.query_dtc_status(0x0100_0000), Err(DiagError::InvalidDtc));
        assert_eq!(table.confirm(0x0100_0000, true), Err(DiagError::InvalidDtc));
        assert!(table.query_dtc_status(MAX_DTC_CODE).is_ok());
    }

    #[test]
    fn test_confirmed_present_listing() {
        let table = DtcTable::new();
        table.confirm(0x00D200, true).unwrap();
        table.confirm(0x00A100, true).unwrap();
        table.confirm(0x00B300, false).unwrap();

        assert_eq!(table.query_all_confirmed_present_dtcs(), vec![0x00A100, 0x00D200]);
        assert_eq!(table.query_dtc_status(0x00B300), Ok(DtcStatus::ConfirmedAbsent));
        assert_eq!(DtcStatus::ConfirmedPresent as u8, 3);
        assert_eq!(DtcStatus::ConfirmedAbsent as u8, 4);
    }

    #[test]
    fn test_confirmation_notified_on_change_only() {
        let table = DtcTable::new();
        let (seen, _sub) = record(table.dtc_confirmation());

        table.confirm(0x00A100, true).unwrap();
        table.confirm(0x00A100, true).unwrap();
        table.confirm(0x00A100, false).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                DtcConfirmation {
                    code: 0x00A100,
                    status: DtcStatus::ConfirmedPresent
                },
                DtcConfirmation {
                    code: 0x00A100,
                    status: DtcStatus::ConfirmedAbsent
                },
            ]
        );
    }
}

mod remote_access_tests {
    use super::*;

    #[test]
    fn test_gateway_applies_timeout() {
        let gateway = RemoteAccessGateway::new(
            RemoteAccessConfig {
                timeout_ms: 250,
                ..RemoteAccessConfig::default()
            },
            MockPort::new_recording(),
        )
        .unwrap();
        assert_eq!(gateway.into_port().map(|p| p.timeout_ms), Some(250));
    }

    #[test]
    fn test_door_and_horn_frames() {
        let (gateway, sent) = create_gateway(RemoteAccessConfig::default());
        gateway.request_lock_all_doors().unwrap();
        gateway.request_remote_horn_on().unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, ID_REMOTE_REQUEST);
        assert_eq!(sent[0].data, vec![0x01, 0]);
        assert_eq!(sent[1].data, vec![0x10, 1]);
    }

    #[test]
    fn test_signal_widths() {
        let (gateway, sent) = create_gateway(RemoteAccessConfig::default());
        assert_eq!(gateway.send_info_location_web(3), Ok(()));
        assert_eq!(gateway.send_info_location_web(4), Err(RasError::InvalidArgument));
        assert_eq!(gateway.send_no2_web_value(4095), Ok(()));
        assert_eq!(gateway.send_no2_web_value(4096), Err(RasError::InvalidArgument));
        assert_eq!(gateway.send_o3_web_value(2047), Ok(()));
        assert_eq!(gateway.send_o3_web_value(2048), Err(RasError::InvalidArgument));
        assert_eq!(gateway.send_pm25_web_value(1023), Ok(()));
        assert_eq!(gateway.send_pm25_web_value(1024), Err(RasError::InvalidArgument));
        assert_eq!(gateway.send_so2_web_value(4096), Err(RasError::InvalidArgument));

        assert_eq!(sent.lock().unwrap().len(), 4);
        assert_eq!(sent.lock().unwrap()[1].data, vec![0x01, 0x0F, 0xFF]);
    }

    #[test]
    fn test_immobilizer_password_length() {
        let (gateway, sent) = create_gateway(RemoteAccessConfig::default());
        assert_eq!(gateway.request_immo_off(""), Err(RasError::InvalidArgument));
        assert_eq!(gateway.request_immo_off("123456"), Err(RasError::InvalidArgument));
        assert_eq!(gateway.request_immo_on("12345678"), Err(RasError::InvalidArgument));
        assert_eq!(gateway.request_immo_on("1234567"), Ok(()));

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, ID_IMMOBILIZER);
        assert_eq!(sent[0].data[0], 1);
        assert_eq!(&sent[0].data[1..], b"1234567");
    }

    #[test]
    fn test_climate_screen_payload() {
        let (gateway, sent) = create_gateway(RemoteAccessConfig::default());
        gateway.send_ecran_info_prg_clim_rem([1, 2, 3, 4, 5, 6, 7]).unwrap();
        gateway.send_ecran_info_prg_rtab_rem([9, 8]).unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].id, ID_ECRAN_INFO_PRG_CLIM_REM);
        assert_eq!(sent[0].data, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(sent[1].data.len(), ECRAN_INFO_PRG_RTAB_REM_SIZE);
    }

    #[test]
    fn test_disabled_command_not_supported() {
        let (gateway, sent) = create_gateway(RemoteAccessConfig {
            disabled: vec![CommandKind::UnlockTrunk],
            ..RemoteAccessConfig::default()
        });
        assert_eq!(gateway.request_unlock_trunk(), Err(RasError::NotSupported));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_port_failure_is_error() {
        let gateway =
            RemoteAccessGateway::new(RemoteAccessConfig::default(), MockPort::new_error()).unwrap();
        assert_eq!(gateway.request_turn_lights_on(), Err(RasError::Error));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let config = RemoteAccessConfig {
            timeout_ms: 0,
            ..RemoteAccessConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(RemoteAccessGateway::new(config, MockPort::new_recording()).is_err());
    }

    #[test]
    fn test_disabled_list_from_toml() {
        let config: RemoteAccessConfig =
            toml::from_str("disabled = [\"horn_on\", \"immo_off\"]").unwrap();
        assert_eq!(config.disabled, vec![CommandKind::HornOn, CommandKind::ImmoOff]);
        assert_eq!(config.timeout_ms, 100);
    }

    proptest::proptest! {
        #[test]
        fn prop_pm25_width(value in 0u16..=u16::MAX) {
            let (gateway, _sent) = create_gateway(RemoteAccessConfig::default());
            let result = gateway.send_pm25_web_value(value);
            proptest::prop_assert_eq!(result.is_ok(), value < 1024);
        }
    }
}
