//! Dot-separated field paths over a JSON document.
//!
//! `result.breakdown.exports.*.cn_code` walks object keys; a `*` segment fans
//! out over every element of an array. Each resolved item keeps the concrete
//! path it was reached by, so findings can point at the offending element.

use serde_json::Value;

/// One item reached by a path. `value` is `None` when the path ended at a
/// missing key.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<'a> {
    pub path: String,
    pub value: Option<&'a Value>,
}

/// Resolve `path` against `doc`.
///
/// A missing key yields a single `None` item at the point it went missing.
/// Fanning out over an empty array yields no items at all.
pub fn resolve<'a>(doc: &'a Value, path: &str) -> Vec<Resolved<'a>> {
    let mut frontier = vec![Resolved {
        path: String::new(),
        value: Some(doc),
    }];
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let mut next = Vec::with_capacity(frontier.len());
        for item in frontier {
            let current = match item.value {
                Some(v) => v,
                None => {
                    next.push(item);
                    continue;
                }
            };
            if segment == "*" {
                if let Value::Array(elements) = current {
                    for (i, element) in elements.iter().enumerate() {
                        next.push(Resolved {
                            path: join(&item.path, &i.to_string()),
                            value: Some(element),
                        });
                    }
                } else {
                    next.push(Resolved {
                        path: join(&item.path, segment),
                        value: None,
                    });
                }
                continue;
            }
            let child = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(elements) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| elements.get(i)),
                _ => None,
            };
            next.push(Resolved {
                path: join(&item.path, segment),
                value: child,
            });
        }
        frontier = next;
    }
    frontier
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

/// Present and not `null`.
pub fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

/// Present with content: non-blank string, non-empty array or object.
pub fn is_non_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_nested_objects() {
        let doc = json!({ "input": { "facility": { "id": "F1" } } });
        let got = resolve(&doc, "input.facility.id");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].value, Some(&json!("F1")));
        assert_eq!(got[0].path, "input.facility.id");
    }

    #[test]
    fn missing_key_resolves_to_none() {
        let doc = json!({ "input": {} });
        let got = resolve(&doc, "input.monitoring_plan.method");
        assert_eq!(got.len(), 1);
        assert!(got[0].value.is_none());
    }

    #[test]
    fn star_fans_out_over_arrays() {
        let doc = json!({ "exports": [ { "cn": "7208" }, { "cn": null }, {} ] });
        let got = resolve(&doc, "exports.*.cn");
        let paths: Vec<&str> = got.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["exports.0.cn", "exports.1.cn", "exports.2.cn"]);
        assert!(is_present(got[0].value));
        assert!(!is_present(got[1].value));
        assert!(!is_present(got[2].value));
    }

    #[test]
    fn star_over_empty_array_yields_nothing() {
        let doc = json!({ "exports": [] });
        assert!(resolve(&doc, "exports.*.cn").is_empty());
    }

    #[test]
    fn blank_strings_are_empty() {
        assert!(!is_non_empty(Some(&json!("  "))));
        assert!(is_non_empty(Some(&json!(0))));
        assert!(!is_non_empty(Some(&json!([]))));
    }
}
