use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::{OPTION_RETAIN, OPTION_RO, SCHEME_NFS, SCHEME_PVC};

/// Characters forbidden inside any grammar token (`src`, `mntpoint`, `subpath`, `key`, `value`).
const RESERVED: [char; 4] = [':', '#', ',', '='];

/// A logical volume parsed out of a `Service.volumes` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub scheme: String,
    pub attr: BTreeMap<String, String>,
}

/// The mount side of a parsed volume-spec, attached to a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    pub sub_path: Option<String>,
    pub read_only: bool,
}

/// Failure modes of the volume-spec grammar in `parse`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VolumeSpecError {
    #[error("volume spec `{0}` is empty")]
    Empty(String),
    #[error("volume spec `{0}` has no `:` separating source from mount point")]
    MissingMountPoint(String),
    #[error("nfs volume spec `{0}` must be `/<server>/<path...>`")]
    MalformedNfsSource(String),
    #[error("volume spec `{0}` contains a reserved character inside a token")]
    ReservedCharacter(String),
    #[error("volume spec `{0}` uses unknown scheme `{1}`, expected `pvc` or `nfs`")]
    UnknownScheme(String, String),
}

/// Parse a single `Service.volumes` entry into a `(Volume, VolumeMount)` pair.
///
/// Grammar:
/// `[<scheme>://]<src>:<mntpoint>[#<subpath>][,<options>]`
/// where `<scheme>` is `pvc` (default) or `nfs`, and `<options>` is a
/// comma-separated list of `key[=value]` pairs (value defaults to `"true"`).
pub fn parse(name: &str, spec: &str) -> Result<(Volume, VolumeMount), VolumeSpecError> {
    if spec.is_empty() {
        return Err(VolumeSpecError::Empty(spec.to_owned()));
    }

    let (scheme, rest) = match spec.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => (SCHEME_PVC, spec),
    };
    if scheme != SCHEME_PVC && scheme != SCHEME_NFS {
        return Err(VolumeSpecError::UnknownScheme(
            spec.to_owned(),
            scheme.to_owned(),
        ));
    }

    let (body, options_raw) = match rest.split_once(',') {
        Some((body, opts)) => (body, Some(opts)),
        None => (rest, None),
    };
    let (body, subpath) = match body.split_once('#') {
        Some((body, subpath)) => (body, Some(subpath)),
        None => (body, None),
    };
    let Some((src, mntpoint)) = body.split_once(':') else {
        return Err(VolumeSpecError::MissingMountPoint(spec.to_owned()));
    };

    for token in [src, mntpoint] {
        check_reserved(spec, token)?;
    }
    if let Some(subpath) = subpath {
        check_reserved(spec, subpath)?;
    }

    let mut options = BTreeMap::new();
    if let Some(options_raw) = options_raw {
        for option in options_raw.split(',') {
            let (key, value) = match option.split_once('=') {
                Some((key, value)) => (key, value.to_owned()),
                None => (option, "true".to_owned()),
            };
            check_reserved(spec, key)?;
            check_reserved(spec, &value)?;
            options.insert(key.to_owned(), value);
        }
    }

    let mut attr = BTreeMap::new();
    match scheme {
        SCHEME_PVC => {
            attr.insert("claim".to_owned(), src.to_owned());
        }
        SCHEME_NFS => {
            let parts: Vec<&str> = src.splitn(3, '/').collect();
            if parts.len() < 3 {
                return Err(VolumeSpecError::MalformedNfsSource(spec.to_owned()));
            }
            // `src` is "/<server>/<path...>"; splitn(3, '/') on a leading slash
            // yields ["", server, path-tail].
            let server = parts[1];
            let path = parts[2];
            if server.is_empty() {
                return Err(VolumeSpecError::MalformedNfsSource(spec.to_owned()));
            }
            attr.insert("server".to_owned(), server.to_owned());
            attr.insert("path".to_owned(), format!("/{path}"));
        }
        _ => unreachable!("scheme validated above"),
    }
    for (key, value) in &options {
        attr.insert(key.clone(), value.clone());
    }

    let read_only = options.get(OPTION_RO).is_some_and(|v| v == "true");

    Ok((
        Volume {
            name: name.to_owned(),
            scheme: scheme.to_owned(),
            attr,
        },
        VolumeMount {
            name: name.to_owned(),
            mount_path: mntpoint.to_owned(),
            sub_path: subpath.map(str::to_owned),
            read_only,
        },
    ))
}

/// Whether a parsed volume's options requested retention (exemption from GC and ownership).
pub fn is_retained(volume: &Volume) -> bool {
    volume
        .attr
        .get(OPTION_RETAIN)
        .is_some_and(|v| v == "true")
}

fn check_reserved(spec: &str, token: &str) -> Result<(), VolumeSpecError> {
    if token.contains(RESERVED) {
        return Err(VolumeSpecError::ReservedCharacter(spec.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_bare_pvc_with_default_scheme() {
        let (volume, mount) = parse("data", "my-claim:/data").unwrap();
        assert_eq!(volume.scheme, "pvc");
        assert_eq!(volume.attr.get("claim"), Some(&"my-claim".to_owned()));
        assert_eq!(mount.mount_path, "/data");
        assert_eq!(mount.sub_path, None);
        assert!(!mount.read_only);
    }

    #[test]
    fn parses_explicit_pvc_scheme_with_subpath_and_options() {
        let (volume, mount) = parse("data", "pvc://my-claim:/data#sub,ro,retain=true").unwrap();
        assert_eq!(volume.attr.get("claim"), Some(&"my-claim".to_owned()));
        assert_eq!(mount.sub_path.as_deref(), Some("sub"));
        assert!(mount.read_only);
        assert!(is_retained(&volume));
    }

    #[test]
    fn parses_nfs_source() {
        let (volume, mount) = parse("data", "nfs:///fileserver/exports/a:/data").unwrap();
        assert_eq!(volume.scheme, "nfs");
        assert_eq!(volume.attr.get("server"), Some(&"fileserver".to_owned()));
        assert_eq!(volume.attr.get("path"), Some(&"/exports/a".to_owned()));
        assert_eq!(mount.mount_path, "/data");
    }

    #[test]
    fn rejects_nfs_source_with_too_few_parts() {
        let err = parse("data", "nfs://fileserver:/data").unwrap_err();
        assert_eq!(
            err,
            VolumeSpecError::MalformedNfsSource("nfs://fileserver:/data".to_owned())
        );
    }

    #[test]
    fn rejects_missing_mount_point() {
        let err = parse("data", "my-claim").unwrap_err();
        assert_eq!(
            err,
            VolumeSpecError::MissingMountPoint("my-claim".to_owned())
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = parse("data", "s3://bucket:/data").unwrap_err();
        assert_eq!(
            err,
            VolumeSpecError::UnknownScheme("s3://bucket:/data".to_owned(), "s3".to_owned())
        );
    }

    #[test]
    fn option_without_value_defaults_true() {
        let (volume, mount) = parse("data", "claim:/data,ro").unwrap();
        assert!(mount.read_only);
        assert_eq!(volume.attr.get("ro"), Some(&"true".to_owned()));
    }
}
