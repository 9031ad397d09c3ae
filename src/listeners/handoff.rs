// src/listeners/handoff.rs

//! Descriptor handoff through environment variables.
//!
//! Each inherited listener travels as one variable
//! `<PREFIX>_INHERIT_<ordinal>` whose value is `"<fd>:<scheme>://<address>"`.
//! The ordinal preserves the listener order of the exporting process.

use crate::errors::LaunchError;

use super::uri::BindUri;
use super::{ListenerDescriptor, RawDescriptor};

/// Prefix used for every variable this crate exports.
pub const ENV_PREFIX: &str = "RESPAWN";

fn inherit_marker(prefix: &str) -> String {
    format!("{prefix}_INHERIT_")
}

/// Name of the variable carrying the listener at `ordinal`.
pub fn inherit_var_name(prefix: &str, ordinal: usize) -> String {
    format!("{}{ordinal}", inherit_marker(prefix))
}

/// Whether `name` is one of the handoff variables for `prefix`.
pub fn is_inherit_var(prefix: &str, name: &str) -> bool {
    name.strip_prefix(&inherit_marker(prefix))
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Names of the handoff variables present in this process's environment.
pub fn inherited_var_names(prefix: &str) -> Vec<String> {
    std::env::vars_os()
        .filter_map(|(name, _)| name.into_string().ok())
        .filter(|name| is_inherit_var(prefix, name))
        .collect()
}

/// Encode a single descriptor as a variable value.
pub fn encode_value(descriptor: &ListenerDescriptor) -> String {
    format!("{}:{}", descriptor.fd, descriptor.uri)
}

/// Decode a single variable value.
pub fn decode_value(value: &str) -> Result<ListenerDescriptor, LaunchError> {
    let (fd, uri) = value.split_once(':').ok_or_else(|| LaunchError::InvalidBind {
        uri: value.to_string(),
        reason: "expected '<fd>:<uri>'".to_string(),
    })?;
    let fd: RawDescriptor = fd.parse().map_err(|e| LaunchError::InvalidBind {
        uri: value.to_string(),
        reason: format!("invalid descriptor number '{fd}': {e}"),
    })?;
    if fd < 0 {
        return Err(LaunchError::InvalidBind {
            uri: value.to_string(),
            reason: format!("negative descriptor number {fd}"),
        });
    }
    let uri: BindUri = uri.parse()?;
    Ok(ListenerDescriptor { uri, fd })
}

/// Encode an ordered listener set into `(name, value)` pairs.
pub fn encode_inherit_vars<'a>(
    prefix: &str,
    descriptors: impl IntoIterator<Item = &'a ListenerDescriptor>,
) -> Vec<(String, String)> {
    descriptors
        .into_iter()
        .enumerate()
        .map(|(i, d)| (inherit_var_name(prefix, i), encode_value(d)))
        .collect()
}

/// Decode every handoff variable for `prefix` found in `vars`, ordered by
/// ordinal. Unrelated variables are ignored; a malformed handoff value is an
/// error.
pub fn decode_inherit_vars<I, K, V>(
    prefix: &str,
    vars: I,
) -> Result<Vec<ListenerDescriptor>, LaunchError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let marker = inherit_marker(prefix);
    let mut found: Vec<(usize, ListenerDescriptor)> = Vec::new();

    for (name, value) in vars {
        let name = name.as_ref();
        if !is_inherit_var(prefix, name) {
            continue;
        }
        let ordinal: usize = name[marker.len()..]
            .parse()
            .map_err(|e| LaunchError::ConfigError(format!("bad handoff variable {name}: {e}")))?;
        found.push((ordinal, decode_value(value.as_ref())?));
    }

    found.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(found.into_iter().map(|(_, d)| d).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::Scheme;

    fn descriptor(uri: &str, fd: RawDescriptor) -> ListenerDescriptor {
        ListenerDescriptor {
            uri: uri.parse().unwrap(),
            fd,
        }
    }

    #[test]
    fn encodes_fd_and_uri_per_ordinal() {
        let set = vec![
            descriptor("tcp://0.0.0.0:9292", 7),
            descriptor("unix:///tmp/app.sock", 8),
        ];
        let vars = encode_inherit_vars(ENV_PREFIX, &set);
        assert_eq!(
            vars,
            vec![
                ("RESPAWN_INHERIT_0".to_string(), "7:tcp://0.0.0.0:9292".to_string()),
                ("RESPAWN_INHERIT_1".to_string(), "8:unix:///tmp/app.sock".to_string()),
            ]
        );
    }

    #[test]
    fn decode_orders_by_ordinal_not_by_iteration_order() {
        let vars = vec![
            ("RESPAWN_INHERIT_10", "12:tcp://127.0.0.1:3"),
            ("PATH", "/usr/bin"),
            ("RESPAWN_INHERIT_2", "11:unix://a.sock"),
            ("RESPAWN_INHERIT_0", "10:ssl://127.0.0.1:1"),
            ("OTHER_INHERIT_0", "99:tcp://127.0.0.1:9"),
        ];
        let decoded = decode_inherit_vars(ENV_PREFIX, vars).unwrap();
        let fds: Vec<_> = decoded.iter().map(|d| d.fd).collect();
        assert_eq!(fds, vec![10, 11, 12]);
        assert_eq!(decoded[0].uri.scheme(), Scheme::Ssl);
        assert_eq!(decoded[1].uri.address(), "a.sock");
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(decode_value("tcp://127.0.0.1:1").is_err());
        assert!(decode_value("x:tcp://127.0.0.1:1").is_err());
        assert!(decode_value("-3:tcp://127.0.0.1:1").is_err());
        assert!(decode_value("3:gopher://host:70").is_err());
    }

    #[test]
    fn inherit_var_detection_requires_numeric_suffix() {
        assert!(is_inherit_var(ENV_PREFIX, "RESPAWN_INHERIT_3"));
        assert!(!is_inherit_var(ENV_PREFIX, "RESPAWN_INHERIT_"));
        assert!(!is_inherit_var(ENV_PREFIX, "RESPAWN_INHERIT_x"));
        assert!(!is_inherit_var(ENV_PREFIX, "RESPAWN_LOG"));
    }
}
