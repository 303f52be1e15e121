//! Static descriptions of abilities and applications, plus the small value
//! types that travel with lifecycle and query calls.

use std::collections::BTreeMap;

use ipc::Parcel;
use ipc::Parcelable;
use ipc::parcel;

use crate::state::AbilityState;
use crate::want::ElementName;

fn invalid(what: &str, v: i32) -> parcel::Error {
    parcel::Error::InvalidValue(format!("{} {}", what, v))
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AbilityType {
    #[default]
    Unknown = 0,
    Page = 1,
    Service = 2,
    Data = 3,
    Extension = 4,
}

impl AbilityType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(AbilityType::Unknown),
            1 => Some(AbilityType::Page),
            2 => Some(AbilityType::Service),
            3 => Some(AbilityType::Data),
            4 => Some(AbilityType::Extension),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AbilityType::Unknown => "UNKNOWN",
            AbilityType::Page => "PAGE",
            AbilityType::Service => "SERVICE",
            AbilityType::Data => "DATA",
            AbilityType::Extension => "EXTENSION",
        }
    }

    /// Abilities reached through connect rather than foreground.
    pub fn is_service_like(self) -> bool {
        matches!(self, AbilityType::Service | AbilityType::Extension)
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExtensionAbilityType {
    Form = 0,
    Service = 3,
    DataShare = 5,
    Backup = 9,
    #[default]
    Unspecified = 255,
}

impl ExtensionAbilityType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(ExtensionAbilityType::Form),
            3 => Some(ExtensionAbilityType::Service),
            5 => Some(ExtensionAbilityType::DataShare),
            9 => Some(ExtensionAbilityType::Backup),
            255 => Some(ExtensionAbilityType::Unspecified),
            _ => None,
        }
    }

    pub fn read(p: &mut Parcel) -> parcel::Result<Self> {
        let v = p.read_i32()?;
        Self::from_i32(v).ok_or_else(|| invalid("extension type", v))
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LaunchMode {
    #[default]
    Singleton = 0,
    Standard = 1,
    Specified = 2,
}

impl LaunchMode {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(LaunchMode::Singleton),
            1 => Some(LaunchMode::Standard),
            2 => Some(LaunchMode::Specified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbilityInfo {
    pub name: String,
    pub bundle_name: String,
    pub module_name: String,
    pub ability_type: AbilityType,
    pub extension_type: ExtensionAbilityType,
    pub launch_mode: LaunchMode,
    pub visible: bool,
}

impl AbilityInfo {
    pub fn element(&self) -> ElementName {
        ElementName::new(&self.bundle_name, &self.name).with_module(&self.module_name)
    }
}

impl Parcelable for AbilityInfo {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_string(&self.name)?;
        p.write_string(&self.bundle_name)?;
        p.write_string(&self.module_name)?;
        p.write_i32(self.ability_type as i32)?;
        p.write_i32(self.extension_type as i32)?;
        p.write_i32(self.launch_mode as i32)?;
        p.write_bool(self.visible)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        let name = p.read_string()?;
        let bundle_name = p.read_string()?;
        let module_name = p.read_string()?;
        let ty = p.read_i32()?;
        let ability_type = AbilityType::from_i32(ty).ok_or_else(|| invalid("ability type", ty))?;
        let extension_type = ExtensionAbilityType::read(p)?;
        let mode = p.read_i32()?;
        let launch_mode = LaunchMode::from_i32(mode).ok_or_else(|| invalid("launch mode", mode))?;
        let visible = p.read_bool()?;
        Ok(Self { name, bundle_name, module_name, ability_type, extension_type, launch_mode, visible })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplicationInfo {
    pub name: String,
    pub bundle_name: String,
    pub uid: i32,
    pub is_launcher_app: bool,
    /// Resident applications are restarted when their process dies.
    pub keep_alive: bool,
}

impl Parcelable for ApplicationInfo {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_string(&self.name)?;
        p.write_string(&self.bundle_name)?;
        p.write_i32(self.uid)?;
        p.write_bool(self.is_launcher_app)?;
        p.write_bool(self.keep_alive)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self {
            name: p.read_string()?,
            bundle_name: p.read_string()?,
            uid: p.read_i32()?,
            is_launcher_app: p.read_bool()?,
            keep_alive: p.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartOptions {
    pub display_id: i32,
    pub window_mode: i32,
}

impl Parcelable for StartOptions {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_i32(self.display_id)?;
        p.write_i32(self.window_mode)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self { display_id: p.read_i32()?, window_mode: p.read_i32()? })
    }
}

/// System configuration pushed to running abilities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Configuration {
    entries: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl Parcelable for Configuration {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        let values: Vec<String> = self.entries.values().cloned().collect();
        p.write_string_vec(&keys)?;
        p.write_string_vec(&values)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        let keys = p.read_string_vec()?;
        let values = p.read_string_vec()?;
        if keys.len() != values.len() {
            return Err(parcel::Error::InvalidValue("configuration key/value count mismatch".into()));
        }
        Ok(Self { entries: keys.into_iter().zip(values).collect() })
    }
}

/// Target of a scheduled lifecycle transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleStateInfo {
    pub state: AbilityState,
    pub is_new_want: bool,
    pub scene_flag: u32,
}

impl LifecycleStateInfo {
    pub fn new(state: AbilityState) -> Self {
        Self { state, is_new_want: false, scene_flag: 0 }
    }
}

impl Parcelable for LifecycleStateInfo {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_i32(self.state.as_i32())?;
        p.write_bool(self.is_new_want)?;
        p.write_u32(self.scene_flag)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self {
            state: AbilityState::read(p)?,
            is_new_want: p.read_bool()?,
            scene_flag: p.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityRunningInfo {
    pub element: ElementName,
    pub pid: i32,
    pub uid: i32,
    pub process_name: String,
    /// Milliseconds since the Unix epoch.
    pub start_time: i64,
    pub ability_state: AbilityState,
}

impl Parcelable for AbilityRunningInfo {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_parcelable(&self.element)?;
        p.write_i32(self.pid)?;
        p.write_i32(self.uid)?;
        p.write_string(&self.process_name)?;
        p.write_i64(self.start_time)?;
        p.write_i32(self.ability_state.as_i32())
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self {
            element: p.read_parcelable()?,
            pid: p.read_i32()?,
            uid: p.read_i32()?,
            process_name: p.read_string()?,
            start_time: p.read_i64()?,
            ability_state: AbilityState::read(p)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRunningInfo {
    pub element: ElementName,
    pub pid: i32,
    pub uid: i32,
    pub process_name: String,
    pub start_time: i64,
    /// Bundles of the callers currently connected.
    pub client_packages: Vec<String>,
    pub extension_type: ExtensionAbilityType,
}

impl Parcelable for ExtensionRunningInfo {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_parcelable(&self.element)?;
        p.write_i32(self.pid)?;
        p.write_i32(self.uid)?;
        p.write_string(&self.process_name)?;
        p.write_i64(self.start_time)?;
        p.write_string_vec(&self.client_packages)?;
        p.write_i32(self.extension_type as i32)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self {
            element: p.read_parcelable()?,
            pid: p.read_i32()?,
            uid: p.read_i32()?,
            process_name: p.read_string()?,
            start_time: p.read_i64()?,
            client_packages: p.read_string_vec()?,
            extension_type: ExtensionAbilityType::read(p)?,
        })
    }
}

/// Payload of connection-observer notifications.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionData {
    pub extension_element: ElementName,
    pub extension_type: ExtensionAbilityType,
    pub caller_uid: i32,
    pub caller_pid: i32,
    pub caller_name: String,
}

impl Parcelable for ConnectionData {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_parcelable(&self.extension_element)?;
        p.write_i32(self.extension_type as i32)?;
        p.write_i32(self.caller_uid)?;
        p.write_i32(self.caller_pid)?;
        p.write_string(&self.caller_name)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self {
            extension_element: p.read_parcelable()?,
            extension_type: ExtensionAbilityType::read(p)?,
            caller_uid: p.read_i32()?,
            caller_pid: p.read_i32()?,
            caller_name: p.read_string()?,
        })
    }
}
