//! # Want
//!
//! The intent object: which ability to reach and with what parameters.

use std::collections::BTreeMap;

use ipc::Parcel;
use ipc::Parcelable;
use ipc::parcel;

pub const ACTION_HOME: &str = "action.system.home";
pub const ENTITY_HOME: &str = "entity.system.home";

/// Set on the want of an ability relaunched by recovery.
pub const PARAM_RECOVERY_RESTART: &str = "ohos.ability.params.abilityRecoveryRestart";
/// Identifies the system ability a result is addressed to.
pub const PARAM_CALLER_ABILITY_ID: &str = "ohos.aafwk.param.callerAbilityId";

/// Fully qualified name of an ability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ElementName {
    pub device_id: String,
    pub bundle_name: String,
    pub module_name: String,
    pub ability_name: String,
}

impl ElementName {
    pub fn new(bundle_name: impl Into<String>, ability_name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            ability_name: ability_name.into(),
            ..Self::default()
        }
    }

    pub fn with_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = module_name.into();
        self
    }

    /// `device/bundle/module/ability`
    pub fn uri(&self) -> String {
        format!("{}/{}/{}/{}", self.device_id, self.bundle_name, self.module_name, self.ability_name)
    }

    pub fn is_empty(&self) -> bool {
        self.bundle_name.is_empty() && self.ability_name.is_empty()
    }

    /// Names the same ability, ignoring device and module.
    pub fn same_ability(&self, other: &ElementName) -> bool {
        self.bundle_name == other.bundle_name && self.ability_name == other.ability_name
    }
}

impl std::fmt::Display for ElementName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri())
    }
}

impl Parcelable for ElementName {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_string(&self.device_id)?;
        p.write_string(&self.bundle_name)?;
        p.write_string(&self.module_name)?;
        p.write_string(&self.ability_name)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self {
            device_id: p.read_string()?,
            bundle_name: p.read_string()?,
            module_name: p.read_string()?,
            ability_name: p.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    String(String),
    StringArray(Vec<String>),
}

impl ParamValue {
    fn kind(&self) -> i32 {
        match self {
            ParamValue::Bool(_) => 1,
            ParamValue::Int(_) => 2,
            ParamValue::Long(_) => 3,
            ParamValue::String(_) => 4,
            ParamValue::StringArray(_) => 5,
        }
    }

    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_i32(self.kind())?;
        match self {
            ParamValue::Bool(v) => p.write_bool(*v),
            ParamValue::Int(v) => p.write_i32(*v),
            ParamValue::Long(v) => p.write_i64(*v),
            ParamValue::String(v) => p.write_string(v),
            ParamValue::StringArray(v) => p.write_string_vec(v),
        }
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        match p.read_i32()? {
            1 => Ok(ParamValue::Bool(p.read_bool()?)),
            2 => Ok(ParamValue::Int(p.read_i32()?)),
            3 => Ok(ParamValue::Long(p.read_i64()?)),
            4 => Ok(ParamValue::String(p.read_string()?)),
            5 => Ok(ParamValue::StringArray(p.read_string_vec()?)),
            other => Err(parcel::Error::InvalidValue(format!("param kind {}", other))),
        }
    }
}

/// Ordered key/value parameters carried by a want (and by saved state).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WantParams {
    entries: BTreeMap<String, ParamValue>,
}

impl WantParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key) {
            Some(ParamValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.entries.get(key) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(ParamValue::String(v)) => Some(v),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.entries.iter()
    }
}

impl Parcelable for WantParams {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        let count = i32::try_from(self.entries.len()).map_err(|_| parcel::Error::BlobTooLarge(self.entries.len()))?;
        p.write_i32(count)?;
        for (key, value) in &self.entries {
            p.write_string(key)?;
            value.marshal(p)?;
        }
        Ok(())
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        let count = p.read_i32()?;
        if count < 0 {
            return Err(parcel::Error::NegativeCount(count));
        }
        let mut params = Self::new();
        for _ in 0..count {
            let key = p.read_string()?;
            let value = ParamValue::unmarshal(p)?;
            params.entries.insert(key, value);
        }
        Ok(params)
    }
}

/// Saved ability state, as produced by `on_save_state`.
pub type PacMap = WantParams;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Want {
    pub element: ElementName,
    pub action: String,
    pub entities: Vec<String>,
    pub uri: String,
    pub flags: u32,
    pub params: WantParams,
}

impl Want {
    pub fn new(element: ElementName) -> Self {
        Self { element, ..Self::default() }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.set(key, value);
        self
    }

    /// Whether this want launches the home screen.
    pub fn is_home_intent(&self) -> bool {
        self.action == ACTION_HOME && self.entities.iter().any(|e| e == ENTITY_HOME)
    }

    pub fn is_recovery_restart(&self) -> bool {
        self.params.get_bool(PARAM_RECOVERY_RESTART).unwrap_or(false)
    }
}

impl Parcelable for Want {
    fn marshal(&self, p: &mut Parcel) -> parcel::Result<()> {
        p.write_parcelable(&self.element)?;
        p.write_string(&self.action)?;
        p.write_string_vec(&self.entities)?;
        p.write_string(&self.uri)?;
        p.write_u32(self.flags)?;
        p.write_parcelable(&self.params)
    }

    fn unmarshal(p: &mut Parcel) -> parcel::Result<Self> {
        Ok(Self {
            element: p.read_parcelable()?,
            action: p.read_string()?,
            entities: p.read_string_vec()?,
            uri: p.read_string()?,
            flags: p.read_u32()?,
            params: p.read_parcelable()?,
        })
    }
}
