use rustc_hash::FxHashMap;

use crate::error::FlowmonError;
use crate::model::FieldValue;
use crate::model::flow::FlowKey;

/// Typed extraction of one field from a flow key.
pub type Accessor = for<'a> fn(&'a FlowKey) -> FieldValue<'a>;

/// Field vocabulary layout. Each mode extends the base fields with one
/// extension set; the engine treats all of them identically.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TableMode {
    /// Basic traffic headers only
    #[default]
    Normal,
    /// Adds OVN logical flow and datapath columns
    Ovn,
    /// Adds OVN ACL name, direction and verdict columns
    OvnAcl,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub get: Accessor,
}

static BASE_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "InIf",
        get: |k| FieldValue::Dec(u64::from(k.in_if)),
    },
    FieldDef {
        name: "OutIf",
        get: |k| FieldValue::Dec(u64::from(k.out_if)),
    },
    FieldDef {
        name: "SrcMac",
        get: |k| FieldValue::Mac(k.src_mac),
    },
    FieldDef {
        name: "DstMac",
        get: |k| FieldValue::Mac(k.dst_mac),
    },
    FieldDef {
        name: "VlanID",
        get: |k| FieldValue::Dec(u64::from(k.vlan_id)),
    },
    FieldDef {
        name: "Etype",
        get: |k| FieldValue::Etype(k.etype),
    },
    FieldDef {
        name: "SrcAddr",
        get: |k| FieldValue::Addr(k.src_addr),
    },
    FieldDef {
        name: "DstAddr",
        get: |k| FieldValue::Addr(k.dst_addr),
    },
    FieldDef {
        name: "Proto",
        get: |k| FieldValue::Proto(k.proto),
    },
    FieldDef {
        name: "SrcPort",
        get: |k| FieldValue::Dec(u64::from(k.src_port)),
    },
    FieldDef {
        name: "DstPort",
        get: |k| FieldValue::Dec(u64::from(k.dst_port)),
    },
    FieldDef {
        name: "SvcPort",
        get: |k| FieldValue::Dec(u64::from(k.svc_port)),
    },
    FieldDef {
        name: "FlowDirection",
        get: |k| FieldValue::Direction(k.direction),
    },
];

static OVN_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "LFUUID",
        get: |k| FieldValue::Text(&k.ovn.lf_uuid),
    },
    FieldDef {
        name: "LFMatch",
        get: |k| FieldValue::Text(&k.ovn.lf_match),
    },
    FieldDef {
        name: "LFActions",
        get: |k| FieldValue::Text(&k.ovn.lf_actions),
    },
    FieldDef {
        name: "LFPipeline",
        get: |k| FieldValue::Text(&k.ovn.lf_pipeline),
    },
    FieldDef {
        name: "LFStage",
        get: |k| FieldValue::Text(&k.ovn.lf_stage),
    },
    FieldDef {
        name: "DPType",
        get: |k| FieldValue::Text(&k.ovn.dp_type),
    },
    FieldDef {
        name: "DPName",
        get: |k| FieldValue::Text(&k.ovn.dp_name),
    },
    FieldDef {
        name: "OFTable",
        get: |k| FieldValue::Int(k.ovn.of_table),
    },
];

static ACL_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "ACLName",
        get: |k| FieldValue::Text(&k.acl.name),
    },
    FieldDef {
        name: "ACLDirection",
        get: |k| FieldValue::Text(&k.acl.direction),
    },
    FieldDef {
        name: "ACLAction",
        get: |k| FieldValue::Text(&k.acl.action),
    },
];

/// Name -> accessor table for one mode. Built once and shared.
#[derive(Debug)]
pub struct FieldTable {
    mode: TableMode,
    defs: Vec<FieldDef>,
    index: FxHashMap<&'static str, usize>,
}

impl FieldTable {
    pub fn new(mode: TableMode) -> Self {
        let extension: &[FieldDef] = match mode {
            TableMode::Normal => &[],
            TableMode::Ovn => OVN_FIELDS,
            TableMode::OvnAcl => ACL_FIELDS,
        };
        let defs: Vec<FieldDef> = BASE_FIELDS.iter().chain(extension).copied().collect();
        let index = defs.iter().enumerate().map(|(i, d)| (d.name, i)).collect();
        Self { mode, defs, index }
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Field names in column order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.defs.iter().map(|d| d.name)
    }

    pub fn def(&self, index: usize) -> &FieldDef {
        &self.defs[index]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Resolve a field name to its column index.
    pub fn lookup(&self, name: &str) -> Result<usize, FlowmonError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| FlowmonError::UnknownField(name.to_string()))
    }

    /// Extract a field by name from a key.
    pub fn value<'a>(&self, key: &'a FlowKey, name: &str) -> Result<FieldValue<'a>, FlowmonError> {
        let idx = self.lookup(name)?;
        Ok((self.defs[idx].get)(key))
    }
}

/// An active key-field subset, resolved against a `FieldTable`.
///
/// Fields are kept in the table's column order regardless of the order they
/// were requested in.
#[derive(Clone, Debug)]
pub struct KeySet {
    indices: Vec<usize>,
    defs: Vec<FieldDef>,
}

impl KeySet {
    pub fn resolve<I, S>(table: &FieldTable, names: I) -> Result<Self, FlowmonError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut indices = names
            .into_iter()
            .map(|n| table.lookup(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        indices.sort_unstable();
        indices.dedup();
        Ok(Self::from_indices(table, indices))
    }

    /// Every field of the table.
    pub fn all(table: &FieldTable) -> Self {
        Self::from_indices(table, (0..table.len()).collect())
    }

    fn from_indices(table: &FieldTable, indices: Vec<usize>) -> Self {
        let defs = indices.iter().map(|&i| *table.def(i)).collect();
        Self { indices, defs }
    }

    /// Flip membership of one field.
    pub fn toggled(&self, table: &FieldTable, name: &str) -> Result<Self, FlowmonError> {
        let idx = table.lookup(name)?;
        let mut indices = self.indices.clone();
        match indices.binary_search(&idx) {
            Ok(pos) => {
                indices.remove(pos);
            }
            Err(pos) => indices.insert(pos, idx),
        }
        Ok(Self::from_indices(table, indices))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.iter().any(|d| d.name == name)
    }

    pub fn contains_index(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDef> {
        self.defs.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.defs.iter().map(|d| d.name).collect()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl PartialEq for KeySet {
    fn eq(&self, other: &Self) -> bool {
        self.indices == other.indices
    }
}

impl Eq for KeySet {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_mode_has_base_fields_only() {
        let table = FieldTable::new(TableMode::Normal);
        assert_eq!(table.len(), 13);
        assert!(table.contains("SrcAddr"));
        assert!(!table.contains("LFUUID"));
        assert!(!table.contains("ACLName"));
    }

    #[test]
    fn extension_modes_append_their_fields() {
        let ovn = FieldTable::new(TableMode::Ovn);
        assert_eq!(ovn.len(), 21);
        assert_eq!(ovn.names().last(), Some("OFTable"));
        assert!(!ovn.contains("ACLAction"));

        let acl = FieldTable::new(TableMode::OvnAcl);
        assert_eq!(acl.len(), 16);
        assert_eq!(acl.names().nth(13), Some("ACLName"));
        assert!(!acl.contains("LFMatch"));
    }

    #[test]
    fn lookup_unknown_field_is_error() {
        let table = FieldTable::new(TableMode::Normal);
        let err = table.lookup("Bogus").unwrap_err();
        assert!(matches!(err, FlowmonError::UnknownField(ref n) if n == "Bogus"));
    }

    #[test]
    fn keyset_follows_table_order_and_dedups() {
        let table = FieldTable::new(TableMode::Normal);
        let keys = KeySet::resolve(&table, ["DstPort", "SrcAddr", "DstPort"]).unwrap();
        assert_eq!(keys.names(), vec!["SrcAddr", "DstPort"]);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn keyset_resolve_rejects_unknown() {
        let table = FieldTable::new(TableMode::Normal);
        assert!(KeySet::resolve(&table, ["SrcAddr", "LFUUID"]).is_err());
    }

    #[test]
    fn keyset_toggle_round_trip() {
        let table = FieldTable::new(TableMode::Normal);
        let all = KeySet::all(&table);
        let without = all.toggled(&table, "Proto").unwrap();
        assert!(!without.contains("Proto"));
        assert_eq!(without.len(), all.len() - 1);
        let back = without.toggled(&table, "Proto").unwrap();
        assert_eq!(back, all);
    }

    #[test]
    fn keyset_empty() {
        let table = FieldTable::new(TableMode::Normal);
        let keys = KeySet::resolve(&table, Vec::<String>::new()).unwrap();
        assert!(keys.is_empty());
        assert!(!keys.contains("SrcAddr"));
    }
}
