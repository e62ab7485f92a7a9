//! OVN sample enrichment.
//!
//! OVN encodes the origin of each IPFIX sample in the observation ids: the top
//! byte of the domain id selects debug or ACL sampling, the remaining 24 bits
//! carry the datapath tunnel key, and the point id is the first 32 bits of the
//! logical flow (or ACL) UUID. The lookups run against a `Catalog`, an offline
//! copy of the relevant Southbound/Northbound rows that can be swapped while
//! workers are reading it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use serde::Deserialize;

use crate::enrichment::{Attributes, Enricher, attr};
use crate::error::FlowmonError;
use crate::model::flow::RawFlow;

pub const DEBUG_DOMAIN: u32 = 1;
pub const ACL_DOMAIN: u32 = 2;

pub const DATAPATH_SWITCH: &str = "logical_switch";
pub const DATAPATH_ROUTER: &str = "logical_router";
pub const DATAPATH_PHYSICAL: &str = "physical";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObservationIds {
    pub domain: u32,
    pub point: u32,
    pub tunnel_key: u32,
}

impl ObservationIds {
    pub fn from_flow(flow: &RawFlow) -> Result<Self, FlowmonError> {
        let domain = (flow.observation_domain_id & 0xFF00_0000) >> 24;
        if domain != DEBUG_DOMAIN && domain != ACL_DOMAIN {
            return Err(FlowmonError::UnsupportedDomain(domain));
        }
        Ok(Self {
            domain,
            point: flow.observation_point_id,
            tunnel_key: flow.observation_domain_id & 0x00FF_FFFF,
        })
    }

    /// Lower-case hex form of the point id, the UUID prefix it refers to.
    fn uuid_prefix(&self) -> String {
        format!("{:08x}", self.point)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogicalFlow {
    pub uuid: String,
    #[serde(default, rename = "match")]
    pub match_: String,
    #[serde(default)]
    pub actions: String,
    #[serde(default)]
    pub pipeline: String,
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DatapathBinding {
    pub tunnel_key: u32,
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Acl {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub logical_flows: Vec<LogicalFlow>,
    pub datapaths: Vec<DatapathBinding>,
    pub acls: Vec<Acl>,
}

impl Catalog {
    pub fn from_json(text: &str) -> Result<Self, FlowmonError> {
        serde_json::from_str(text).map_err(|e| FlowmonError::Catalog(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, FlowmonError> {
        let text = std::fs::read_to_string(path).map_err(FlowmonError::Io)?;
        let catalog = Self::from_json(&text)?;
        log::info!(
            "Loaded catalog {}: {} logical flows, {} datapaths, {} ACLs",
            path.display(),
            catalog.logical_flows.len(),
            catalog.datapaths.len(),
            catalog.acls.len()
        );
        Ok(catalog)
    }

    fn logical_flow(&self, ids: &ObservationIds) -> Result<&LogicalFlow, FlowmonError> {
        let prefix = ids.uuid_prefix();
        first_unique(
            self.logical_flows.iter().filter(|lf| lf.uuid.starts_with(&prefix)),
            || format!("logical flow with observation point {prefix}"),
        )
    }

    fn datapath(&self, tunnel_key: u32) -> Result<&DatapathBinding, FlowmonError> {
        first_unique(
            self.datapaths.iter().filter(|dp| dp.tunnel_key == tunnel_key),
            || format!("datapath binding with tunnel key {tunnel_key}"),
        )
    }

    fn acl(&self, ids: &ObservationIds) -> Result<&Acl, FlowmonError> {
        let prefix = ids.uuid_prefix();
        first_unique(
            self.acls.iter().filter(|acl| acl.uuid.starts_with(&prefix)),
            || format!("ACL with observation point {prefix}"),
        )
    }
}

/// Take the first match, warning when there is more than one.
fn first_unique<'a, T: 'a>(
    mut matches: impl Iterator<Item = &'a T>,
    what: impl Fn() -> String,
) -> Result<&'a T, FlowmonError> {
    let first = matches
        .next()
        .ok_or_else(|| FlowmonError::Enrichment(format!("no {}", what())))?;
    if matches.next().is_some() {
        log::warn!("more than one {}, using the first", what());
    }
    Ok(first)
}

/// Shared, hot-swappable catalog.
pub type CatalogHandle = Arc<ArcSwap<Catalog>>;

pub fn new_catalog_handle(catalog: Catalog) -> CatalogHandle {
    Arc::new(ArcSwap::from_pointee(catalog))
}

/// Reloads a catalog file into its handle when the file's modification time
/// changes. A failed reload keeps the previous catalog.
pub struct CatalogWatcher {
    path: PathBuf,
    handle: CatalogHandle,
    modified: Option<SystemTime>,
}

impl CatalogWatcher {
    /// Load `path` and start watching it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FlowmonError> {
        let path = path.into();
        let modified = modified_time(&path);
        let handle = new_catalog_handle(Catalog::load(&path)?);
        Ok(Self {
            path,
            handle,
            modified,
        })
    }

    pub fn handle(&self) -> &CatalogHandle {
        &self.handle
    }

    /// Returns true when a new catalog was published.
    pub fn reload_if_changed(&mut self) -> bool {
        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.modified {
            return false;
        }
        self.modified = modified;
        match Catalog::load(&self.path) {
            Ok(catalog) => {
                self.handle.store(Arc::new(catalog));
                true
            }
            Err(e) => {
                log::warn!(
                    "Keeping previous catalog, reload of {} failed: {e}",
                    self.path.display()
                );
                false
            }
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Adds logical flow and datapath attributes (`ovn` mode).
pub struct LogicalFlowEnricher {
    catalog: CatalogHandle,
}

impl LogicalFlowEnricher {
    pub fn new(catalog: CatalogHandle) -> Self {
        Self { catalog }
    }
}

impl Enricher for LogicalFlowEnricher {
    fn name(&self) -> &str {
        "ovn-logical-flow"
    }

    fn enrich(&self, flow: &RawFlow, attrs: &mut Attributes) -> Result<(), FlowmonError> {
        let ids = ObservationIds::from_flow(flow)?;
        let catalog = self.catalog.load();

        if ids.tunnel_key == 0 {
            attrs.insert(attr::DP_TYPE.into(), DATAPATH_PHYSICAL.into());
            attrs.insert(attr::DP_NAME.into(), "".into());
            attrs.insert(attr::OF_TABLE.into(), i64::from(ids.point).into());
            return Ok(());
        }

        let dp = catalog.datapath(ids.tunnel_key)?;
        let dp_type = if dp.external_ids.get("logical-switch").is_some_and(|v| !v.is_empty()) {
            DATAPATH_SWITCH
        } else if dp.external_ids.get("logical-router").is_some_and(|v| !v.is_empty()) {
            DATAPATH_ROUTER
        } else {
            return Err(FlowmonError::Enrichment(format!(
                "datapath binding {} has unsupported type",
                dp.tunnel_key
            )));
        };
        let dp_name = dp.external_ids.get("name").cloned().unwrap_or_default();
        let lflow = catalog.logical_flow(&ids)?;

        attrs.insert(attr::LF_UUID.into(), lflow.uuid.clone().into());
        attrs.insert(attr::LF_MATCH.into(), lflow.match_.clone().into());
        attrs.insert(attr::LF_ACTIONS.into(), lflow.actions.clone().into());
        attrs.insert(attr::LF_PIPELINE.into(), lflow.pipeline.clone().into());
        attrs.insert(
            attr::LF_STAGE.into(),
            lflow.external_ids.get("stage-name").cloned().unwrap_or_default().into(),
        );
        attrs.insert(attr::DP_TYPE.into(), dp_type.into());
        attrs.insert(attr::DP_NAME.into(), dp_name.into());
        attrs.insert(attr::OF_TABLE.into(), (-1i64).into());
        Ok(())
    }
}

/// Adds ACL name, direction and verdict (`ovn-acl` mode).
pub struct AclEnricher {
    catalog: CatalogHandle,
}

impl AclEnricher {
    pub fn new(catalog: CatalogHandle) -> Self {
        Self { catalog }
    }
}

impl Enricher for AclEnricher {
    fn name(&self) -> &str {
        "ovn-acl"
    }

    fn enrich(&self, flow: &RawFlow, attrs: &mut Attributes) -> Result<(), FlowmonError> {
        let ids = ObservationIds::from_flow(flow)?;
        let catalog = self.catalog.load();
        let acl = catalog.acl(&ids)?;

        attrs.insert(
            attr::ACL_NAME.into(),
            acl.name.clone().unwrap_or_default().into(),
        );
        attrs.insert(attr::ACL_DIRECTION.into(), acl.direction.clone().into());
        attrs.insert(attr::ACL_ACTION.into(), acl.action.clone().into());
        Ok(())
    }
}
