use std::collections::BTreeMap;

use sluice_task::Task;

/// Environment handed to the container for one invocation.
///
/// Route config keys are upper-cased. Headers (route headers first, then the
/// request's own, which win on conflict) become `HEADER_<NAME>` with `-`
/// mapped to `_`; multiple values are joined with `", "`.
pub fn invocation_env(task: &Task) -> BTreeMap<String, String> {
  let route = task.route();
  let mut env = BTreeMap::new();

  for (key, value) in &route.config {
    env.insert(key.to_uppercase(), value.clone());
  }

  for (name, values) in route.headers.iter().chain(task.headers()) {
    let var = format!("HEADER_{}", name.to_uppercase().replace('-', "_"));
    env.insert(var, values.join(", "));
  }

  env.insert("APP_NAME".to_string(), route.app_name.clone());
  env.insert("ROUTE".to_string(), route.path.clone());
  env.insert("CALL_ID".to_string(), task.id().to_string());
  env.insert("FORMAT".to_string(), route.format.as_str().to_string());
  env.insert("MEMORY_MB".to_string(), route.memory.to_string());

  env
}
