use std::sync::Arc;

use ipc::DispatchTable;
use ipc::MessageOption;
use ipc::Parcel;
use ipc::RemoteStub;
use ipc::status;
use ipc::stub::check_interface_token;
use ipc::stub::default_on_remote_request;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::AbilityManager;
use super::DESCRIPTOR;
use super::request::AbilityRequest;
use super::request::dispatch_table;

/// Receives ability manager requests and hands them to a service.
pub struct AbilityManagerStub {
    service: Arc<dyn AbilityManager>,
    table: DispatchTable<AbilityRequest>,
}

impl AbilityManagerStub {
    pub fn new(service: Arc<dyn AbilityManager>) -> Self {
        Self { service, table: dispatch_table() }
    }

    pub fn table(&self) -> &DispatchTable<AbilityRequest> {
        &self.table
    }
}

#[async_trait::async_trait]
impl RemoteStub for AbilityManagerStub {
    fn descriptor(&self) -> &str {
        DESCRIPTOR
    }

    async fn on_remote_request(&self, code: u32, data: &mut Parcel, reply: &mut Parcel, _option: MessageOption) -> i32 {
        if !check_interface_token(data, DESCRIPTOR) {
            return status::ERR_INVALID_STATE;
        }
        let Some(entry) = self.table.get(code) else {
            return default_on_remote_request(DESCRIPTOR, code, reply);
        };
        let request = match (entry.decode)(data) {
            Ok(request) => request,
            Err(e) => {
                warn!(op = entry.name, error = %e, "malformed request");
                return status::ERR_INVALID_VALUE;
            }
        };
        debug!(op = entry.name, "dispatching");
        let outcome = request.dispatch(self.service.as_ref()).await;
        if let Err(e) = outcome.encode(reply) {
            error!(op = entry.name, error = %e, "failed to write reply");
            return status::ERR_INVALID_DATA;
        }
        status::ERR_NONE
    }
}
