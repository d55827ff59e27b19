//! TraceHouse Core
//!
//! Shared building blocks for the TraceHouse trace ingestion pipeline:
//!
//! - **Data model**: `Trace` as submitted by callers, and `BufferedTrace`, the
//!   server-side envelope created at ingestion
//! - **Principals**: `PrincipalId`, the non-nil UUID that owns a storage subtree
//! - **Categories**: sanitization of caller-supplied category paths into
//!   filesystem-safe segments
//! - **Opaque keys**: `KeyCipher`, the reversible token scheme that lets callers
//!   address a principal without learning its id
//!
//! ## Example
//!
//! ```ignore
//! use tracehouse_core::{BufferedTrace, KeyCipher, PrincipalId, Trace, TraceLevel};
//!
//! let cipher = KeyCipher::new("secret")?;
//! let principal = PrincipalId::random();
//! let token = cipher.encode_principal(&principal);
//! assert_eq!(cipher.decode_principal(&token), Some(principal));
//!
//! let trace = Trace::new(TraceLevel::Info, chrono::Utc::now(), "api/orders");
//! let buffered = BufferedTrace::new(trace);
//! ```

pub mod buffered;
pub mod category;
pub mod error;
pub mod key;
pub mod principal;
pub mod trace;
pub mod value;

pub use buffered::BufferedTrace;
pub use category::{category_path, sanitize_category, sanitize_segment, CATEGORY_SEPARATOR};
pub use error::{CoreError, Result};
pub use key::{KeyCipher, DECODE_CAPACITY, PRINCIPAL_KEY_MAX_BYTES};
pub use principal::PrincipalId;
pub use trace::{Trace, TraceLevel, TraceVersion};
pub use value::{Decimal, TraceValue, TraceValues};
