//! External services the runtime depends on but does not own: the bundle
//! registry, the app manager, and the permission service.

use std::collections::HashSet;

use dashmap::DashMap;
use ipc::ObjectRef;

use crate::error::Result;
use crate::info::AbilityInfo;
use crate::info::ApplicationInfo;
use crate::want::ElementName;
use crate::want::Want;

pub const PERMISSION_CLEAN_BACKGROUND_PROCESSES: &str = "ohos.permission.CLEAN_BACKGROUND_PROCESSES";
pub const PERMISSION_KILL_APP_PROCESSES: &str = "ohos.permission.KILL_APP_PROCESSES";
pub const PERMISSION_UPDATE_CONFIGURATION: &str = "ohos.permission.UPDATE_CONFIGURATION";

/// Resolves component names to installed abilities.
pub trait BundleResolver: Send + Sync + 'static {
    fn resolve_ability(&self, element: &ElementName) -> Option<AbilityInfo>;

    fn resolve_application(&self, bundle_name: &str) -> Option<ApplicationInfo>;
}

/// An in-memory bundle registry.
#[derive(Default)]
pub struct StaticBundleResolver {
    abilities: DashMap<(String, String), AbilityInfo>,
    applications: DashMap<String, ApplicationInfo>,
}

impl StaticBundleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, ability: AbilityInfo, app: ApplicationInfo) {
        self.applications.insert(app.bundle_name.clone(), app);
        self.abilities
            .insert((ability.bundle_name.clone(), ability.name.clone()), ability);
    }

    /// Installs an ability whose application is unknown.
    pub fn install_orphan(&self, ability: AbilityInfo) {
        self.abilities
            .insert((ability.bundle_name.clone(), ability.name.clone()), ability);
    }

    pub fn uninstall(&self, bundle_name: &str) {
        self.applications.remove(bundle_name);
        self.abilities.retain(|(bundle, _), _| bundle != bundle_name);
    }
}

impl BundleResolver for StaticBundleResolver {
    fn resolve_ability(&self, element: &ElementName) -> Option<AbilityInfo> {
        self.abilities
            .get(&(element.bundle_name.clone(), element.ability_name.clone()))
            .map(|entry| entry.value().clone())
    }

    fn resolve_application(&self, bundle_name: &str) -> Option<ApplicationInfo> {
        self.applications.get(bundle_name).map(|entry| entry.value().clone())
    }
}

/// The app manager: owns application processes.
#[async_trait::async_trait]
pub trait AppScheduler: Send + Sync + 'static {
    /// Starts (or reuses) the process for `app` and has it create the
    /// ability identified by `token`. Returns the process id. The process
    /// later calls `attach_ability_thread` with the same token.
    async fn load_ability(&self, token: ObjectRef, ability: AbilityInfo, app: ApplicationInfo, want: Want) -> Result<i32>;

    async fn kill_process(&self, bundle_name: &str) -> Result<()>;

    async fn kill_process_by_pid(&self, pid: i32) -> Result<()>;
}

/// Authorizes privileged operations for the current caller.
pub trait PermissionVerifier: Send + Sync + 'static {
    fn verify(&self, permission: &str) -> bool;
}

pub struct AllowAll;

impl PermissionVerifier for AllowAll {
    fn verify(&self, _permission: &str) -> bool {
        true
    }
}

/// Grants exactly the listed permissions.
#[derive(Debug, Default, Clone)]
pub struct GrantedPermissions {
    granted: HashSet<String>,
}

impl GrantedPermissions {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { granted: permissions.into_iter().map(Into::into).collect() }
    }
}

impl PermissionVerifier for GrantedPermissions {
    fn verify(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }
}
