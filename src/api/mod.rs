//! Purpose: Define the stable public Rust API boundary for cachewire.
//! Exports: Codec types and operations needed by callers and the CLI.
//! Role: Public, additive-only surface; hides internal codec modules.
//! Invariants: This module is the only public path to codec primitives.
//! Invariants: Internal modules remain private and are not directly exposed.

pub use crate::core::codec::{BINARY_MARKER_KEY, Codec, CodecOptions, dump, load};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::hooks::{ContainerHook, ContainerHooks, FLASH_CONTAINER_KEY};
pub use crate::core::legacy::{LEGACY_SENTINEL, LegacyCodec, TaggedBinary};
pub use crate::core::value::{Foreign, MapKey, Value};
