use ipc::ObjectRef;

use crate::info::Configuration;
use crate::want::PacMap;
use crate::want::Want;

/// The application's ability implementation. Every callback runs on the
/// app's main task loop; none of them may block.
pub trait AbilityLifecycle: Send + Sync + 'static {
    fn on_start(&self, _want: &Want) {}

    fn on_foreground(&self, _want: &Want) {}

    fn on_background(&self) {}

    /// The ability was started again while already running.
    fn on_new_want(&self, _want: &Want) {}

    fn on_save_state(&self) -> PacMap {
        PacMap::new()
    }

    fn on_restore_state(&self, _state: &PacMap) {}

    fn on_configuration_updated(&self, _config: &Configuration) {}

    /// Returns the object handed to connecting clients.
    fn on_connect(&self, _want: &Want) -> Option<ObjectRef> {
        None
    }

    fn on_disconnect(&self, _want: &Want) {}

    fn on_command(&self, _want: &Want, _restart: bool, _start_id: i32) {}

    fn on_ability_result(&self, _request_code: i32, _result_code: i32, _want: &Want) {}

    /// Returns the callee handed to callers.
    fn on_call(&self) -> Option<ObjectRef> {
        None
    }

    fn on_stop(&self) {}
}
