/// Label carrying the GUID of the owning Instance, set on every derived object.
pub const LABEL_INSTANCE_ID: &str = "helx.renci.org/id";
/// Label that exempts a derived object from an owner reference and garbage collection when set to `"true"`.
pub const LABEL_RETAIN: &str = "helx.renci.org/retain";

/// Environment variable carrying the Instance's GUID, injected into every container.
pub const ENV_GUID: &str = "GUID";
/// Environment variable carrying the resolved user handle.
pub const ENV_USER: &str = "USER";
/// Environment variable carrying the app class name.
pub const ENV_APP_CLASS_NAME: &str = "APP_CLASS_NAME";
/// Environment variable carrying the App's name.
pub const ENV_APP_NAME: &str = "APP_NAME";
/// Environment variable carrying the Instance's name.
pub const ENV_INSTANCE_NAME: &str = "INSTANCE_NAME";
/// Environment variable reserved for a container's advertised host; always empty today.
pub const ENV_HOST: &str = "HOST";

/// Volume scheme backed by a PersistentVolumeClaim.
pub const SCHEME_PVC: &str = "pvc";
/// Volume scheme backed by an NFS export.
pub const SCHEME_NFS: &str = "nfs";

/// Volume-spec option marking a mount read-only.
pub const OPTION_RO: &str = "ro";
/// Volume-spec option exempting the derived PVC from ownership and GC.
pub const OPTION_RETAIN: &str = "retain";

/// Value that opts a labeled object into retention.
pub const RETAIN_TRUE: &str = "true";
