//! Bidirectional mapping between URL templates (`/users/{identifier}/inbox`)
//! and concrete paths, used to serve and to construct every federation
//! endpoint.

use std::collections::BTreeMap;

use apfed_error::{ApfedError, Result};

/// One path segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone)]
struct Route {
    name: String,
    template: String,
    segments: Vec<Segment>,
}

/// The result of a successful [`Router::route`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

/// A registry of URL templates, each keyed by a unique name.
#[derive(Debug, Default, Clone)]
pub struct Router {
    routes: Vec<Route>,
}

fn parse_template(template: &str) -> Result<Vec<Segment>> {
    if !template.starts_with('/') {
        return Err(ApfedError::malformed_input(
            "template must begin with '/'",
        )
        .with_context("template", template));
    }
    let mut segments = Vec::new();
    for raw in template.split('/').filter(|s| !s.is_empty()) {
        let opens = raw.matches('{').count();
        let closes = raw.matches('}').count();
        if opens != closes || opens > 1 {
            return Err(ApfedError::malformed_input("unbalanced placeholder braces")
                .with_context("template", template)
                .with_context("segment", raw));
        }
        if opens == 1 {
            if !raw.starts_with('{') || !raw.ends_with('}') {
                return Err(ApfedError::malformed_input("unbalanced placeholder braces")
                    .with_context("template", template));
            }
            let name = &raw[1..raw.len() - 1];
            if name.is_empty() {
                return Err(ApfedError::malformed_input("placeholder name is empty")
                    .with_context("template", template));
            }
            segments.push(Segment::Placeholder(name.to_string()));
        } else {
            segments.push(Segment::Literal(raw.to_string()));
        }
    }
    Ok(segments)
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `template` under `name`, returning the set of placeholder
    /// names it declares. Fails with `MalformedInput` for a template that
    /// does not start with `/` or has unbalanced braces, and with
    /// `DuplicateRegistration` if `name` is already registered.
    pub fn add(&mut self, template: &str, name: &str) -> Result<Vec<String>> {
        if self.routes.iter().any(|r| r.name == name) {
            return Err(ApfedError::duplicate_registration(format!(
                "route name already registered: {name}"
            )));
        }
        let segments = parse_template(template)?;
        let placeholders: Vec<String> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(p) => Some(p.clone()),
                Segment::Literal(_) => None,
            })
            .collect();
        self.routes.push(Route {
            name: name.to_string(),
            template: template.to_string(),
            segments,
        });
        Ok(placeholders)
    }

    /// Matches `path` against every registered template. Among templates
    /// with the same segment count, the one with the most literal (matched)
    /// segments wins; ties are broken by registration order.
    pub fn route(&self, path: &str) -> Option<RouteMatch> {
        let path = path.split('?').next().unwrap_or(path);
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let mut best: Option<(usize, &Route, BTreeMap<String, String>)> = None;
        for route in &self.routes {
            if route.segments.len() != path_segments.len() {
                continue;
            }
            let mut values = BTreeMap::new();
            let mut literal_matches = 0usize;
            let mut ok = true;
            for (seg, actual) in route.segments.iter().zip(path_segments.iter()) {
                match seg {
                    Segment::Literal(lit) => {
                        if lit == actual {
                            literal_matches += 1;
                        } else {
                            ok = false;
                            break;
                        }
                    }
                    Segment::Placeholder(name) => {
                        let decoded = urlencoding::decode(actual)
                            .map(|c| c.into_owned())
                            .unwrap_or_else(|_| (*actual).to_string());
                        values.insert(name.clone(), decoded);
                    }
                }
            }
            if !ok {
                continue;
            }
            let better = match &best {
                None => true,
                Some((best_score, _, _)) => literal_matches > *best_score,
            };
            if better {
                best = Some((literal_matches, route, values));
            }
        }

        best.map(|(_, route, values)| RouteMatch {
            name: route.name.clone(),
            values,
        })
    }

    /// Substitutes placeholder values into the template registered as
    /// `name`. Fails with `NotFound` if `name` is unregistered and
    /// `MalformedInput` if a required placeholder value is absent.
    pub fn build(&self, name: &str, values: &BTreeMap<String, String>) -> Result<String> {
        let route = self
            .routes
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ApfedError::not_found(format!("no route registered: {name}")))?;

        let mut path = String::new();
        for segment in &route.segments {
            path.push('/');
            match segment {
                Segment::Literal(lit) => path.push_str(lit),
                Segment::Placeholder(p) => {
                    let value = values.get(p).ok_or_else(|| {
                        ApfedError::malformed_input(format!("missing value for placeholder: {p}"))
                            .with_context("template", &route.template)
                    })?;
                    path.push_str(&urlencoding::encode(value));
                }
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn add_rejects_non_absolute_template() {
        let mut router = Router::new();
        let err = router.add("users/{identifier}", "actor").unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::MalformedInput);
    }

    #[test]
    fn add_rejects_unbalanced_braces() {
        let mut router = Router::new();
        let err = router.add("/users/{identifier", "actor").unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::MalformedInput);
    }

    #[test]
    fn add_rejects_duplicate_name() {
        let mut router = Router::new();
        router.add("/users/{identifier}", "actor").unwrap();
        let err = router.add("/users/{identifier}/inbox", "actor").unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::DuplicateRegistration);
    }

    #[test]
    fn round_trip_build_then_route() {
        let mut router = Router::new();
        router.add("/users/{identifier}", "actor").unwrap();
        router.add("/users/{identifier}/inbox", "inbox").unwrap();

        let vals = values(&[("identifier", "alice")]);
        let path = router.build("actor", &vals).unwrap();
        assert_eq!(path, "/users/alice");

        let matched = router.route(&path).unwrap();
        assert_eq!(matched.name, "actor");
        assert_eq!(matched.values, vals);
    }

    #[test]
    fn build_fails_on_missing_value() {
        let mut router = Router::new();
        router.add("/users/{identifier}", "actor").unwrap();
        let err = router.build("actor", &BTreeMap::new()).unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::MalformedInput);
    }

    #[test]
    fn more_specific_literal_route_wins_over_placeholder_route() {
        let mut router = Router::new();
        router.add("/.well-known/webfinger", "webfinger").unwrap();
        router.add("/{catchall}", "catchall").unwrap();

        let matched = router.route("/.well-known/webfinger").unwrap();
        assert_eq!(matched.name, "webfinger");
    }

    #[test]
    fn values_are_percent_encoded_and_decoded() {
        let mut router = Router::new();
        router.add("/users/{identifier}", "actor").unwrap();
        let vals = values(&[("identifier", "a b/c")]);
        let path = router.build("actor", &vals).unwrap();
        assert!(path.contains("%20"));
        let matched = router.route(&path).unwrap();
        assert_eq!(matched.values.get("identifier").unwrap(), "a b/c");
    }

    #[test]
    fn route_returns_none_for_unmatched_path() {
        let mut router = Router::new();
        router.add("/users/{identifier}", "actor").unwrap();
        assert!(router.route("/posts/1").is_none());
    }
}
