pub mod ovn;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::FlowmonError;
use crate::model::flow::RawFlow;

/// Attribute names understood by the normalizer. They match the field names
/// of the corresponding columns.
pub mod attr {
    pub const LF_UUID: &str = "LFUUID";
    pub const LF_MATCH: &str = "LFMatch";
    pub const LF_ACTIONS: &str = "LFActions";
    pub const LF_PIPELINE: &str = "LFPipeline";
    pub const LF_STAGE: &str = "LFStage";
    pub const DP_TYPE: &str = "DPType";
    pub const DP_NAME: &str = "DPName";
    pub const OF_TABLE: &str = "OFTable";
    pub const ACL_NAME: &str = "ACLName";
    pub const ACL_DIRECTION: &str = "ACLDirection";
    pub const ACL_ACTION: &str = "ACLAction";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Text(String),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Flat, accumulating attribute map passed through the enricher chain.
pub type Attributes = FxHashMap<String, AttrValue>;

/// Adds attributes to a flow before it reaches the flow table.
///
/// An enricher must either insert all of its attributes or none: a failed
/// lookup returns an error and leaves `attrs` untouched.
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;
    fn enrich(&self, flow: &RawFlow, attrs: &mut Attributes) -> Result<(), FlowmonError>;
}

/// Runs enrichers in a fixed order. Failures are logged and skipped.
#[derive(Default)]
pub struct EnricherChain {
    enrichers: Vec<Box<dyn Enricher>>,
}

impl EnricherChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, enricher: impl Enricher + 'static) -> Self {
        self.enrichers.push(Box::new(enricher));
        self
    }

    pub fn push(&mut self, enricher: Box<dyn Enricher>) {
        self.enrichers.push(enricher);
    }

    pub fn len(&self) -> usize {
        self.enrichers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    pub fn run(&self, flow: &RawFlow, attrs: &mut Attributes) {
        for enricher in &self.enrichers {
            if let Err(e) = enricher.enrich(flow, attrs) {
                log::debug!("enricher {} skipped flow: {e}", enricher.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, &'static str);

    impl Enricher for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn enrich(&self, _flow: &RawFlow, attrs: &mut Attributes) -> Result<(), FlowmonError> {
            attrs.insert(self.0.to_string(), self.1.into());
            Ok(())
        }
    }

    struct Failing;

    impl Enricher for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn enrich(&self, _flow: &RawFlow, _attrs: &mut Attributes) -> Result<(), FlowmonError> {
            Err(FlowmonError::Enrichment("no such entry".into()))
        }
    }

    #[test]
    fn runs_in_order_and_accumulates() {
        let chain = EnricherChain::new()
            .with(Fixed(attr::DP_NAME, "first"))
            .with(Fixed(attr::DP_TYPE, "router"))
            .with(Fixed(attr::DP_NAME, "second"));
        let mut attrs = Attributes::default();
        chain.run(&RawFlow::default(), &mut attrs);
        assert_eq!(attrs.get(attr::DP_NAME), Some(&AttrValue::from("second")));
        assert_eq!(attrs.get(attr::DP_TYPE), Some(&AttrValue::from("router")));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn failures_are_swallowed() {
        let chain = EnricherChain::new()
            .with(Failing)
            .with(Fixed(attr::ACL_NAME, "web"));
        let mut attrs = Attributes::default();
        chain.run(&RawFlow::default(), &mut attrs);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get(attr::ACL_NAME), Some(&AttrValue::from("web")));
    }

    #[test]
    fn attr_value_deserializes_untagged() {
        let attrs: Attributes =
            serde_json::from_str(r#"{"OFTable": -1, "DPName": "sw0"}"#).unwrap();
        assert_eq!(attrs.get(attr::OF_TABLE), Some(&AttrValue::Int(-1)));
        assert_eq!(attrs.get(attr::DP_NAME), Some(&AttrValue::from("sw0")));
    }
}
