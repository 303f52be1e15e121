//! Callers waiting for an ability's result.

use std::sync::Arc;
use std::sync::Weak;

use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::parcel;
use tracing::debug;

use super::AbilityRecord;
use crate::error::Result;
use crate::want::PARAM_CALLER_ABILITY_ID;
use crate::want::ParamValue;
use crate::want::Want;

/// Request code on a system ability's caller token that carries a result.
pub const SYSTEM_ABILITY_SEND_RESULT: u32 = 1;

/// A result stored on the caller until it can be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityResult {
    pub request_code: i32,
    pub result_code: i32,
    pub want: Want,
}

/// A privileged caller outside the ability framework. Its results bypass
/// the caller's scheduler and go straight to its token.
pub struct SystemAbilityCallerRecord {
    src_ability_id: String,
    caller_token: ObjectRef,
}

impl SystemAbilityCallerRecord {
    pub fn new(src_ability_id: impl Into<String>, caller_token: ObjectRef) -> Self {
        Self { src_ability_id: src_ability_id.into(), caller_token }
    }

    pub fn src_ability_id(&self) -> &str {
        &self.src_ability_id
    }

    pub fn caller_token(&self) -> &ObjectRef {
        &self.caller_token
    }

    /// Pushes a result to the system ability.
    pub async fn send_result(&self, request_code: i32, result_code: i32, mut want: Want) -> Result<()> {
        want.params
            .set(PARAM_CALLER_ABILITY_ID, ParamValue::String(self.src_ability_id.clone()));
        let data = encode_result(self.caller_token.descriptor(), request_code, result_code, &want)?;
        self.caller_token
            .send_request(SYSTEM_ABILITY_SEND_RESULT, data, MessageOption::oneway())
            .await?;
        debug!(src = %self.src_ability_id, request_code, result_code, "result sent to system ability");
        Ok(())
    }
}

fn encode_result(descriptor: &str, request_code: i32, result_code: i32, want: &Want) -> parcel::Result<Parcel> {
    let mut p = Parcel::new();
    p.write_interface_token(descriptor)?;
    p.write_i32(request_code)?;
    p.write_i32(result_code)?;
    p.write_parcelable(want)?;
    Ok(p)
}

pub enum CallerKind {
    /// An ability that started this one for a result.
    Ability(Weak<AbilityRecord>),
    SystemAbility(Arc<SystemAbilityCallerRecord>),
}

pub struct CallerRecord {
    request_code: i32,
    kind: CallerKind,
}

impl CallerRecord {
    pub fn ability(request_code: i32, caller: &Arc<AbilityRecord>) -> Self {
        Self { request_code, kind: CallerKind::Ability(Arc::downgrade(caller)) }
    }

    pub fn system_ability(request_code: i32, caller: SystemAbilityCallerRecord) -> Self {
        Self { request_code, kind: CallerKind::SystemAbility(Arc::new(caller)) }
    }

    pub fn request_code(&self) -> i32 {
        self.request_code
    }

    pub fn kind(&self) -> &CallerKind {
        &self.kind
    }

    /// The calling ability, if it is an ability and still exists.
    pub fn caller_ability(&self) -> Option<Arc<AbilityRecord>> {
        match &self.kind {
            CallerKind::Ability(caller) => caller.upgrade(),
            CallerKind::SystemAbility(_) => None,
        }
    }

    pub fn system_ability_record(&self) -> Option<&Arc<SystemAbilityCallerRecord>> {
        match &self.kind {
            CallerKind::SystemAbility(record) => Some(record),
            CallerKind::Ability(_) => None,
        }
    }

    /// Whether this entry was made by the ability with record id `id`.
    pub fn is_ability(&self, id: i64) -> bool {
        self.caller_ability().is_some_and(|c| c.id() == id)
    }
}
