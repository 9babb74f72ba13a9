//! Sluice Route
//!
//! A route maps an application + URL path to a container image and the
//! policy used to run it. Routes come in two shapes:
//!
//! - [`RouteDef`]: the raw, serializable definition as stored by the route
//!   management API. Fields are plain strings/numbers and may be unset.
//! - [`Route`]: a validated definition with defaults applied and typed
//!   [`RouteType`] / [`Format`]. Only this shape is ever executed.
//!
//! Turning one into the other is a two-step, side-effect-free process:
//!
//! ```text
//! RouteDef ──normalize()──▶ RouteDef' ──check_invariants()──▶ Vec<Violation>
//!                                     └──────validate()─────▶ Result<Route, ValidationError>
//! ```

mod def;
mod filter;
mod route;
mod validate;

pub use def::{DEFAULT_MEMORY_MB, RouteDef, normalize};
pub use filter::RouteFilter;
pub use route::{Format, Route, RouteKey, RouteType};
pub use validate::{ValidationError, Violation, check_invariants, validate};
