use log::debug;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use crate::types::{LoadError, Record};

const REMOTE_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// Reads a scientific data file into a nested record.
///
/// Errors from the reader are handed back to the caller unchanged.
pub trait RecordReader {
    fn read(&self, path: &Path, variable_names: Option<&[String]>) -> Result<Record, LoadError>;
}

/// Where a recording lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A URL
    Remote(String),
    /// An existing local file
    Local(PathBuf),
}

impl Source {
    pub fn is_remote(&self) -> bool {
        matches!(self, Source::Remote(_))
    }
}

/// Classifies `identifier` as a URL or a local path.
///
/// URLs are recognised by syntax alone and never touch the filesystem.
/// Anything else must name an existing file.
pub fn resolve_source(identifier: &str) -> Result<Source, LoadError> {
    if is_url(identifier) {
        return Ok(Source::Remote(identifier.to_string()));
    }

    let path = PathBuf::from(identifier);
    if !path.exists() {
        return Err(LoadError::NotFound(path));
    }
    Ok(Source::Local(path))
}

/// Resolves `identifier` and reads it with `reader`.
///
/// Remote sources are reported as [`LoadError::RemoteUnsupported`]; nothing
/// is downloaded.
pub fn load_raw<R: RecordReader + ?Sized>(
    identifier: &str,
    variable_names: Option<&[String]>,
    reader: &R,
) -> Result<Record, LoadError> {
    match resolve_source(identifier)? {
        Source::Remote(url) => Err(LoadError::RemoteUnsupported { url }),
        Source::Local(path) => {
            debug!("Loading {}", path.display());
            reader.read(&path, variable_names)
        }
    }
}

/// Returns true if `candidate` is an absolute http(s) or ftp URL with a valid host.
///
/// Hosts may be domain names, `localhost`, IPv4 addresses or bracketed IPv6 literals.
pub fn is_url(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((scheme, rest)) = candidate.split_once("://") else {
        return false;
    };
    if !REMOTE_SCHEMES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(scheme))
    {
        return false;
    }

    let authority = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");
    let authority = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    // Bracketed IPv6 literal, optionally followed by a port
    if let Some(bracketed) = authority.strip_prefix('[') {
        let Some((host, after)) = bracketed.split_once(']') else {
            return false;
        };
        let port_ok = match after.strip_prefix(':') {
            Some(port) => port.parse::<u16>().is_ok(),
            None => after.is_empty(),
        };
        return port_ok && host.parse::<Ipv6Addr>().is_ok();
    }

    let host = match authority.rsplit_once(':') {
        Some((host, port)) => {
            if port.parse::<u16>().is_err() {
                return false;
            }
            host
        }
        None => authority,
    };

    is_valid_host(host)
}

fn is_valid_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") || host.parse::<Ipv4Addr>().is_ok() {
        return true;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    // Top-level domain: letters only
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));

    labels_ok && tld_ok
}
