//! Backend data transfer objects
//!
//! Fields the console does not interpret are kept in `extra` maps so proxied
//! payloads survive a decode/encode pass unchanged.

mod auth;
mod device;
mod trip;

pub use auth::{AuthToken, Credentials, RefreshRequest, SocialLoginRequest};
pub use device::{
    Device, DeviceCredentials, DeviceEvent, DeviceModel, DevicePatch, LorawanDevice,
    LorawanPatch, NetworkServer, NetworkServerRef, Paginated, TableDevice,
};
pub use trip::{Checkpoint, Trip};
