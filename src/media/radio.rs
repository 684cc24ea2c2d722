use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::Event;
use crate::types::Service;

pub const BROADCAST_RECEIVER_SERVICE_NAME: &str = "stla.broadcast.receiver.service.base";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandRange {
    pub min: i32,
    pub max: i32,
    pub manual_step: i32,
    pub auto_step: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableBand {
    pub band: String,
    pub band_range: BandRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramInfo {
    pub band: String,
    pub program_id: String,
    pub ensemble_id: String,
    pub service_index: i32,
    pub service_count: i32,
    pub channel_name: String,
    pub frequency: i32,
    pub program_name: String,
    pub ensemble_name: String,
    pub program_type: i32,
    pub ecc: i32,
    pub quality: String,
    pub capability: Vec<String>,
    pub announcement_type: Vec<String>,
    pub handover_state: String,
    pub current_preset_index: i32,
    pub station_lost: bool,
    pub dab_coding_type: String,
    pub audio_transmission: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementInfo {
    pub band: String,
    pub direct: bool,
    pub program_id: String,
    pub program_name: String,
    pub frequency: i32,
    pub quality: String,
    pub announcement_type: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySettings {
    pub handover: bool,
    pub fm_ta: bool,
    pub af: bool,
    pub epg: bool,
    pub sls: bool,
    pub carison: bool,
    pub tpeg: bool,
    pub journaline: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DabAnnouncementSettings {
    pub area_weather_flash: bool,
    pub program_information: bool,
    pub transport_flash: bool,
    pub news_flash: bool,
    pub financial_report: bool,
    pub event_announcement: bool,
    pub special_event: bool,
    pub warning_service: bool,
    pub road_traffic_flash: bool,
    pub sport_report: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub capability_settings: CapabilitySettings,
    pub dab_announcement_settings: DabAnnouncementSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetListItem {
    pub band: String,
    pub channel_name: String,
    pub ensemble_id: String,
    pub program_id: String,
    pub announcement_type: Vec<String>,
    pub frequency: i32,
    pub program_type: i32,
    pub stable_program_name: String,
    pub ensemble_name: String,
    pub index: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetList {
    pub items: Vec<PresetListItem>,
    pub total_number: i32,
}

#[derive(Debug, Default)]
pub struct BroadcastEvents {
    pub available_bands: Event<Vec<AvailableBand>>,
    pub program_info: Event<ProgramInfo>,
    pub announcement_info: Event<AnnouncementInfo>,
    pub preset_list: Event<PresetList>,
    pub user_settings: Event<UserSettings>,
}

/// Getters return `None` until the tuner has reported the value once.
pub trait BroadcastReceiverService: Service {
    fn program_info(&self) -> Option<Arc<ProgramInfo>>;
    fn available_bands(&self) -> Option<Arc<Vec<AvailableBand>>>;
    fn announcement_info(&self) -> Option<Arc<AnnouncementInfo>>;
    fn preset_list(&self) -> Option<Arc<PresetList>>;
    fn user_settings(&self) -> Option<Arc<UserSettings>>;
    fn events(&self) -> &BroadcastEvents;
}

#[derive(Default)]
struct Snapshot {
    program_info: Option<Arc<ProgramInfo>>,
    available_bands: Option<Arc<Vec<AvailableBand>>>,
    announcement_info: Option<Arc<AnnouncementInfo>>,
    preset_list: Option<Arc<PresetList>>,
    user_settings: Option<Arc<UserSettings>>,
}

/// Last values reported by the tuner
#[derive(Default)]
pub struct BroadcastReceiverCache {
    snapshot: RwLock<Snapshot>,
    events: BroadcastEvents,
}

impl BroadcastReceiverCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn store<T>(&self, value: T, slot: impl FnOnce(&mut Snapshot) -> &mut Option<Arc<T>>) {
        if let Ok(mut snapshot) = self.snapshot.write() {
            *slot(&mut *snapshot) = Some(Arc::new(value));
        }
    }

    fn load<T>(&self, slot: impl FnOnce(&Snapshot) -> &Option<Arc<T>>) -> Option<Arc<T>> {
        self.snapshot
            .read()
            .ok()
            .and_then(|snapshot| slot(&*snapshot).clone())
    }

    pub fn update_program_info(&self, info: ProgramInfo) {
        debug!(program = %info.program_name, band = %info.band, "program info");
        self.store(info.clone(), |s| &mut s.program_info);
        self.events.program_info.notify(&info);
    }

    pub fn update_available_bands(&self, bands: Vec<AvailableBand>) {
        self.store(bands.clone(), |s| &mut s.available_bands);
        self.events.available_bands.notify(&bands);
    }

    pub fn update_announcement_info(&self, info: AnnouncementInfo) {
        self.store(info.clone(), |s| &mut s.announcement_info);
        self.events.announcement_info.notify(&info);
    }

    pub fn update_preset_list(&self, list: PresetList) {
        self.store(list.clone(), |s| &mut s.preset_list);
        self.events.preset_list.notify(&list);
    }

    pub fn update_user_settings(&self, settings: UserSettings) {
        self.store(settings, |s| &mut s.user_settings);
        self.events.user_settings.notify(&settings);
    }
}

impl Service for BroadcastReceiverCache {
    fn service_name(&self) -> &'static str {
        BROADCAST_RECEIVER_SERVICE_NAME
    }
}

impl BroadcastReceiverService for BroadcastReceiverCache {
    fn program_info(&self) -> Option<Arc<ProgramInfo>> {
        self.load(|s| &s.program_info)
    }

    fn available_bands(&self) -> Option<Arc<Vec<AvailableBand>>> {
        self.load(|s| &s.available_bands)
    }

    fn announcement_info(&self) -> Option<Arc<AnnouncementInfo>> {
        self.load(|s| &s.announcement_info)
    }

    fn preset_list(&self) -> Option<Arc<PresetList>> {
        self.load(|s| &s.preset_list)
    }

    fn user_settings(&self) -> Option<Arc<UserSettings>> {
        self.load(|s| &s.user_settings)
    }

    fn events(&self) -> &BroadcastEvents {
        &self.events
    }
}
