//! The client's connection callback, as seen by the service.

use std::sync::Arc;

use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::RemoteStub;
use ipc::parcel;
use ipc::status;
use ipc::stub::check_interface_token;
use ipc::stub::default_on_remote_request;
use tracing::warn;

use crate::want::ElementName;

pub const DESCRIPTOR: &str = "ohos.aafwk.AbilityConnection";

pub const ON_ABILITY_CONNECT_DONE: u32 = 0;
pub const ON_ABILITY_DISCONNECT_DONE: u32 = 1;

#[async_trait::async_trait]
pub trait AbilityConnection: Send + Sync + 'static {
    /// `remote` is the object the service ability returned from its connect
    /// callback. `result_code` is `ERR_OK` on success.
    async fn on_ability_connect_done(&self, element: ElementName, remote: Option<ObjectRef>, result_code: i32);

    async fn on_ability_disconnect_done(&self, element: ElementName, result_code: i32);
}

pub struct AbilityConnectionStub {
    connection: Arc<dyn AbilityConnection>,
}

impl AbilityConnectionStub {
    pub fn new(connection: Arc<dyn AbilityConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait::async_trait]
impl RemoteStub for AbilityConnectionStub {
    fn descriptor(&self) -> &str {
        DESCRIPTOR
    }

    async fn on_remote_request(&self, code: u32, data: &mut Parcel, reply: &mut Parcel, _option: MessageOption) -> i32 {
        if !check_interface_token(data, DESCRIPTOR) {
            return status::ERR_INVALID_STATE;
        }
        let handled = match code {
            ON_ABILITY_CONNECT_DONE => match read_connect_done(data) {
                Ok((element, remote, result_code)) => {
                    self.connection.on_ability_connect_done(element, remote, result_code).await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ON_ABILITY_DISCONNECT_DONE => match read_disconnect_done(data) {
                Ok((element, result_code)) => {
                    self.connection.on_ability_disconnect_done(element, result_code).await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            _ => return default_on_remote_request(DESCRIPTOR, code, reply),
        };
        match handled {
            Ok(()) => status::ERR_NONE,
            Err(e) => {
                warn!(code, error = %e, "malformed connection callback");
                status::ERR_INVALID_VALUE
            }
        }
    }
}

fn read_connect_done(p: &mut Parcel) -> parcel::Result<(ElementName, Option<ObjectRef>, i32)> {
    Ok((p.read_parcelable()?, p.read_optional_remote_object()?, p.read_i32()?))
}

fn read_disconnect_done(p: &mut Parcel) -> parcel::Result<(ElementName, i32)> {
    Ok((p.read_parcelable()?, p.read_i32()?))
}

fn write_connect_done(element: &ElementName, remote: Option<&ObjectRef>, result_code: i32) -> parcel::Result<Parcel> {
    let mut p = Parcel::new();
    p.write_interface_token(DESCRIPTOR)?;
    p.write_parcelable(element)?;
    p.write_optional_remote_object(remote)?;
    p.write_i32(result_code)?;
    Ok(p)
}

fn write_disconnect_done(element: &ElementName, result_code: i32) -> parcel::Result<Parcel> {
    let mut p = Parcel::new();
    p.write_interface_token(DESCRIPTOR)?;
    p.write_parcelable(element)?;
    p.write_i32(result_code)?;
    Ok(p)
}

/// Delivers connection callbacks to a client. Failures are logged.
#[derive(Clone)]
pub struct AbilityConnectionProxy {
    remote: ObjectRef,
}

impl AbilityConnectionProxy {
    pub fn new(remote: ObjectRef) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &ObjectRef {
        &self.remote
    }

    async fn post(&self, code: u32, data: parcel::Result<Parcel>) {
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                warn!(code, error = %e, "failed to encode connection callback");
                return;
            }
        };
        if let Err(e) = self.remote.send_request(code, data, MessageOption::oneway()).await {
            warn!(code, object = %self.remote.object_id(), error = %e, "connection callback failed");
        }
    }
}

#[async_trait::async_trait]
impl AbilityConnection for AbilityConnectionProxy {
    async fn on_ability_connect_done(&self, element: ElementName, remote: Option<ObjectRef>, result_code: i32) {
        let data = write_connect_done(&element, remote.as_ref(), result_code);
        self.post(ON_ABILITY_CONNECT_DONE, data).await
    }

    async fn on_ability_disconnect_done(&self, element: ElementName, result_code: i32) {
        let data = write_disconnect_done(&element, result_code);
        self.post(ON_ABILITY_DISCONNECT_DONE, data).await
    }
}
