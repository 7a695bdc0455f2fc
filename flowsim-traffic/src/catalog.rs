// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Catalogs of the targets that traffic is sent to.
//!
//! A catalog is a YAML (or JSON) file:
//!
//! ```yaml
//! http_sites:
//!   - www.example.com
//!   - { url: intranet, server: web, weight: 3 }
//! ftp_files:
//!   - { base_url: ftp.example.com, file_path: pub/data.bin, size: 2MiB }
//!   - { server: files, file_path: report.txt }
//! ```
//!
//! Entries without a `server` are remote and are reached through the
//! topology's gateway host. Entries with a `server` name a server host of
//! the topology.

use std::fs;
use std::path::Path;

use flowsim_topology::{HostRole, NodeId, Topology};
use serde::{Deserialize, Serialize};

use crate::error::TrafficError;
use crate::sizes::SizeDistribution;
use crate::task::TaskKind;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum HttpSite {
    Url(String),
    Entry(HttpSiteEntry),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HttpSiteEntry {
    pub url: Option<String>,
    pub server: Option<String>,
    pub weight: Option<f64>,
    #[serde(skip_serializing)]
    pub size: Option<SizeDistribution>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct FtpFile {
    pub base_url: Option<String>,
    pub file_path: Option<String>,
    pub server: Option<String>,
    pub weight: Option<f64>,
    #[serde(skip_serializing)]
    pub size: Option<SizeDistribution>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Catalog {
    pub http_sites: Option<Vec<HttpSite>>,
    pub ftp_files: Option<Vec<FtpFile>>,
}

/// A catalog entry resolved against a topology.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub url: String,
    pub host: NodeId,
    pub weight: f64,
    pub size: Option<SizeDistribution>,
}

impl Catalog {
    pub fn from_file(catalog_file: &Path) -> Result<Self, TrafficError> {
        let catalog_str = fs::read_to_string(catalog_file).map_err(|e| {
            TrafficError::Io(format!("Unable to read {}: {e}", catalog_file.display()))
        })?;
        Self::from_string(&catalog_str).map_err(|e| match e {
            TrafficError::Io(msg) => {
                TrafficError::Io(format!("Unable to parse {}: {msg}", catalog_file.display()))
            }
            other => other,
        })
    }

    pub fn from_string(s: &str) -> Result<Self, TrafficError> {
        serde_yaml::from_str(s).map_err(|e| TrafficError::Io(e.to_string()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.http_sites.as_ref().is_none_or(Vec::is_empty)
            && self.ftp_files.as_ref().is_none_or(Vec::is_empty)
    }

    /// Resolve the catalog entries of one kind of traffic.
    pub fn targets(&self, kind: TaskKind, topology: &Topology) -> Result<Vec<Target>, TrafficError> {
        match kind {
            TaskKind::Http => self
                .http_sites
                .iter()
                .flatten()
                .map(|site| resolve_http(site, topology))
                .collect(),
            TaskKind::Ftp => self
                .ftp_files
                .iter()
                .flatten()
                .map(|file| resolve_ftp(file, topology))
                .collect(),
        }
    }
}

/// Targets on every server host offering the service of `kind`.
#[must_use]
pub fn local_targets(kind: TaskKind, topology: &Topology) -> Vec<Target> {
    topology
        .hosts_with_role(HostRole::Server)
        .filter(|node| node.offers(kind.service()))
        .map(|node| Target {
            url: match kind {
                TaskKind::Http => format!("http://{}", node.name),
                TaskKind::Ftp => format!("ftp://{0}/file_from_{0}.txt", node.name),
            },
            host: node.id,
            weight: 1.0,
            size: None,
        })
        .collect()
}

fn check_weight(weight: Option<f64>, what: &str) -> Result<f64, TrafficError> {
    let weight = weight.unwrap_or(1.0);
    if weight.is_finite() && weight > 0.0 {
        Ok(weight)
    } else {
        Err(TrafficError::Configuration(format!(
            "{what}: weight {weight} must be positive"
        )))
    }
}

fn gateway(topology: &Topology, what: &str) -> Result<NodeId, TrafficError> {
    match topology.gateway() {
        Some(node) => Ok(node.id),
        None => Err(TrafficError::Configuration(format!(
            "{what} is remote but the topology has no gateway host"
        ))),
    }
}

fn server(topology: &Topology, name: &str, what: &str) -> Result<NodeId, TrafficError> {
    match topology.node_by_name(name) {
        Some(node) if node.is_host() && node.role == HostRole::Server => Ok(node.id),
        Some(_) => Err(TrafficError::Configuration(format!(
            "{what}: {name} is not a server host"
        ))),
        None => Err(TrafficError::Configuration(format!(
            "{what}: unknown server {name}"
        ))),
    }
}

fn resolve_http(site: &HttpSite, topology: &Topology) -> Result<Target, TrafficError> {
    let entry = match site {
        HttpSite::Url(url) => HttpSiteEntry {
            url: Some(url.clone()),
            ..Default::default()
        },
        HttpSite::Entry(entry) => entry.clone(),
    };

    match (&entry.url, &entry.server) {
        (Some(url), None) => {
            let what = format!("HTTP site {url}");
            Ok(Target {
                url: format!("https://{url}"),
                host: gateway(topology, &what)?,
                weight: check_weight(entry.weight, &what)?,
                size: entry.size,
            })
        }
        (url, Some(name)) => {
            let what = format!("HTTP site on {name}");
            Ok(Target {
                url: format!("http://{}", url.as_deref().unwrap_or(name)),
                host: server(topology, name, &what)?,
                weight: check_weight(entry.weight, &what)?,
                size: entry.size,
            })
        }
        (None, None) => Err(TrafficError::Configuration(
            "HTTP site needs a url or a server".to_string(),
        )),
    }
}

fn resolve_ftp(file: &FtpFile, topology: &Topology) -> Result<Target, TrafficError> {
    match (&file.base_url, &file.server) {
        (Some(base_url), None) => {
            let Some(file_path) = &file.file_path else {
                return Err(TrafficError::Configuration(format!(
                    "FTP file on {base_url} needs a file_path"
                )));
            };
            let what = format!("FTP file {base_url}/{file_path}");
            Ok(Target {
                url: format!("ftp://{base_url}/{file_path}"),
                host: gateway(topology, &what)?,
                weight: check_weight(file.weight, &what)?,
                size: file.size,
            })
        }
        (base_url, Some(name)) => {
            let what = format!("FTP file on {name}");
            let file_path = match &file.file_path {
                Some(path) => path.clone(),
                None => format!("file_from_{name}.txt"),
            };
            Ok(Target {
                url: format!("ftp://{}/{file_path}", base_url.as_deref().unwrap_or(name)),
                host: server(topology, name, &what)?,
                weight: check_weight(file.weight, &what)?,
                size: file.size,
            })
        }
        (None, None) => Err(TrafficError::Configuration(
            "FTP file needs a base_url or a server".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: &str = "graph { h1 -- s1 -- web; s1 -- nat0; \
                            web [role=server]; nat0 [role=gateway] }";

    #[test]
    fn remote_targets_go_through_the_gateway() {
        let topology = Topology::from_dot_str(TOPOLOGY).unwrap();
        let catalog = Catalog::from_string(
            "http_sites: [www.example.com, {url: news.example.com, weight: 2}]\n\
             ftp_files: [{base_url: ftp.example.com, file_path: pub/a.bin}]\n",
        )
        .unwrap();

        let nat = topology.node_by_name("nat0").unwrap().id;
        let http = catalog.targets(TaskKind::Http, &topology).unwrap();
        assert_eq!(http.len(), 2);
        assert_eq!(http[0].url, "https://www.example.com");
        assert_eq!(http[0].host, nat);
        assert_eq!(http[1].weight, 2.0);

        let ftp = catalog.targets(TaskKind::Ftp, &topology).unwrap();
        assert_eq!(ftp[0].url, "ftp://ftp.example.com/pub/a.bin");
    }

    #[test]
    fn server_entries_name_server_hosts() {
        let topology = Topology::from_dot_str(TOPOLOGY).unwrap();
        let catalog =
            Catalog::from_string("ftp_files: [{server: web, size: 1KiB}]").unwrap();
        let ftp = catalog.targets(TaskKind::Ftp, &topology).unwrap();
        assert_eq!(ftp[0].url, "ftp://web/file_from_web.txt");
        assert_eq!(ftp[0].size, Some(SizeDistribution::Fixed(1024)));

        let catalog = Catalog::from_string("http_sites: [{server: h1}]").unwrap();
        assert!(matches!(
            catalog.targets(TaskKind::Http, &topology),
            Err(TrafficError::Configuration(_))
        ));
    }

    #[test]
    fn local_targets_follow_services() {
        let topology = Topology::from_dot_str(TOPOLOGY).unwrap();
        let local = local_targets(TaskKind::Http, &topology);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].url, "http://web");
    }
}
