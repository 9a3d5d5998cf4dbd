pub mod file;
pub mod version;

pub use file::{PatchGuard, PinnedFile};
pub use version::{normalize_tag, Version};
