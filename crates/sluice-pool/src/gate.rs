//! Per-route concurrency gates.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sluice_route::{Route, RouteKey};
use tokio::sync::Semaphore;

#[derive(Debug)]
struct Gate {
  limit: u32,
  semaphore: Arc<Semaphore>,
}

/// One semaphore per route that declares a concurrency limit.
#[derive(Debug, Default)]
pub(crate) struct RouteGates {
  gates: Mutex<HashMap<RouteKey, Gate>>,
}

impl RouteGates {
  /// The gate for `route`, or `None` if the route is unlimited.
  ///
  /// If the route's limit changed since the gate was created, a fresh gate
  /// replaces it; permits held on the old one are simply returned to it.
  pub(crate) fn gate_for(&self, route: &Route) -> Option<Arc<Semaphore>> {
    let limit = route.concurrency_limit()?;
    let mut gates = self.gates.lock();

    let gate = gates.entry(route.key()).or_insert_with(|| Gate {
      limit,
      semaphore: Arc::new(Semaphore::new(limit as usize)),
    });
    if gate.limit != limit {
      *gate = Gate {
        limit,
        semaphore: Arc::new(Semaphore::new(limit as usize)),
      };
    }

    Some(gate.semaphore.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sluice_route::{RouteDef, validate};

  fn route(max_concurrency: u32, format: &str) -> Route {
    validate(RouteDef {
      app_name: "myapp".to_string(),
      path: "/hello".to_string(),
      image: "iron/hello".to_string(),
      format: format.to_string(),
      max_concurrency,
      ..Default::default()
    })
    .unwrap()
  }

  #[test]
  fn test_unlimited_route_has_no_gate() {
    let gates = RouteGates::default();
    assert!(gates.gate_for(&route(0, "")).is_none());
  }

  #[test]
  fn test_gate_is_shared_per_route() {
    let gates = RouteGates::default();
    let a = gates.gate_for(&route(2, "")).unwrap();
    let b = gates.gate_for(&route(2, "")).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.available_permits(), 2);
  }

  #[test]
  fn test_limit_change_replaces_gate() {
    let gates = RouteGates::default();
    let a = gates.gate_for(&route(2, "")).unwrap();
    let b = gates.gate_for(&route(1, "json")).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(b.available_permits(), 1);
  }
}
