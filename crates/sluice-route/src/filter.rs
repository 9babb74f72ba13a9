use serde::{Deserialize, Serialize};

use crate::def::RouteDef;

/// Selects routes for listing. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFilter {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub app_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
}

impl RouteFilter {
  pub fn app(app_name: impl Into<String>) -> Self {
    Self {
      app_name: Some(app_name.into()),
      ..Default::default()
    }
  }

  pub fn matches(&self, def: &RouteDef) -> bool {
    fn field_matches(want: &Option<String>, have: &str) -> bool {
      want.as_deref().is_none_or(|w| w == have)
    }

    field_matches(&self.app_name, &def.app_name)
      && field_matches(&self.path, &def.path)
      && field_matches(&self.image, &def.image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn def(app: &str, path: &str, image: &str) -> RouteDef {
    RouteDef {
      app_name: app.to_string(),
      path: path.to_string(),
      image: image.to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn test_empty_filter_matches_all() {
    assert!(RouteFilter::default().matches(&def("a", "/x", "img")));
  }

  #[test]
  fn test_all_set_fields_must_match() {
    let filter = RouteFilter {
      app_name: Some("a".to_string()),
      image: Some("img".to_string()),
      ..Default::default()
    };
    assert!(filter.matches(&def("a", "/x", "img")));
    assert!(!filter.matches(&def("a", "/x", "other")));
    assert!(!filter.matches(&def("b", "/x", "img")));
  }
}
