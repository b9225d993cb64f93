use std::collections::BTreeMap;

pub type Map = BTreeMap<String, String>;

pub const NAME: &str = "name";
pub const APP: &str = "app";
pub const VERSION: &str = "version";

pub const SIDECAR_INJECT: &str = "sidecar.istio.io/inject";
pub const REVISION: &str = "deployment.kubernetes.io/revision";

/// Labels every pod template carries so selectors can rely on them.
pub fn pod_template(app: &str, caller: &Map) -> Map {
    let mut labels = caller.clone();
    labels.insert(NAME.to_string(), app.to_string());
    labels.insert(APP.to_string(), app.to_string());
    labels.insert(VERSION.to_string(), "v1".to_string());
    labels
}

/// The selector a workload's deployment and service share.
pub fn selector(app: &str) -> Map {
    Some((NAME.to_string(), app.to_string())).into_iter().collect()
}

/// Encodes an equality selector as a `labelSelector` query value.
pub fn query(key: &str, value: &str) -> String {
    format!("{key}%3D{value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    #[test]
    fn derived_labels_win_over_caller_labels() {
        let caller = btreemap! {
            "app".to_string() => "other".to_string(),
            "team".to_string() => "web".to_string(),
        };
        assert_eq!(
            pod_template("gotest", &caller),
            btreemap! {
                "app".to_string() => "gotest".to_string(),
                "name".to_string() => "gotest".to_string(),
                "team".to_string() => "web".to_string(),
                "version".to_string() => "v1".to_string(),
            }
        );
    }

    #[test]
    fn selector_query_is_encoded() {
        assert_eq!(query(APP, "gotest"), "app%3Dgotest");
    }
}
