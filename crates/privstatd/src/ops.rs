//! App-ops capability probing.
//!
//! The app-ops status command returns one integer whose bits describe which
//! introspection features this daemon build supports. Each bit is assembled
//! from an independent probe of the op table; a probe that fails clears its
//! bit instead of failing the command, so older or partially populated
//! tables degrade feature by feature.

use std::collections::HashSet;

use privstat_protocol::{AppOpsMask, CapabilityFlag};
use tracing::debug;

const OPS_TARGET: &str = "privstatd::ops";

/// Mode an op falls back to when no per-package decision exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpMode {
    Allow,
    Ignore,
    Deny,
}

/// One entry of the op table.
#[derive(Debug, Clone)]
pub(crate) struct OpEntry {
    /// Dense numeric id of the op.
    pub(crate) id: u32,
    /// Symbolic op name.
    pub(crate) name: &'static str,
    /// Default mode, when the build knows it.
    pub(crate) default_mode: Option<OpMode>,
    /// Id of the op whose toggle governs this one.
    pub(crate) switch: Option<u32>,
}

/// The daemon's op table.
#[derive(Debug, Clone)]
pub(crate) struct OpTable {
    entries: Vec<OpEntry>,
}

impl OpTable {
    /// The table compiled into this build.
    pub(crate) fn builtin() -> Self {
        Self {
            entries: vec![
                OpEntry {
                    id: 0,
                    name: "coarse-location",
                    default_mode: Some(OpMode::Allow),
                    switch: Some(1),
                },
                OpEntry {
                    id: 1,
                    name: "fine-location",
                    default_mode: Some(OpMode::Allow),
                    switch: Some(1),
                },
                OpEntry {
                    id: 2,
                    name: "camera",
                    default_mode: Some(OpMode::Allow),
                    switch: Some(2),
                },
                OpEntry {
                    id: 3,
                    name: "record-audio",
                    default_mode: Some(OpMode::Allow),
                    switch: Some(3),
                },
                OpEntry {
                    id: 4,
                    name: "read-clipboard",
                    default_mode: Some(OpMode::Ignore),
                    switch: Some(4),
                },
                OpEntry {
                    id: 5,
                    name: "post-notification",
                    default_mode: Some(OpMode::Allow),
                    switch: Some(5),
                },
                OpEntry {
                    id: 6,
                    name: "run-in-background",
                    default_mode: Some(OpMode::Allow),
                    switch: Some(6),
                },
                OpEntry {
                    id: 7,
                    name: "wake-lock",
                    default_mode: Some(OpMode::Deny),
                    switch: Some(6),
                },
            ],
        }
    }

    #[cfg(test)]
    pub(crate) fn from_entries(entries: Vec<OpEntry>) -> Self {
        Self { entries }
    }

    /// Assembles the capability mask from the individual probes.
    pub(crate) fn capability_mask(&self) -> AppOpsMask {
        let mut mask = 0_u32;
        for (flag, works) in [
            (
                CapabilityFlag::OpToDefaultMode,
                self.op_to_default_mode_works(),
            ),
            (CapabilityFlag::OpToSwitch, self.op_to_switch_works()),
            (CapabilityFlag::OpToName, self.op_to_name_works()),
            (CapabilityFlag::OpNumConsistent, self.op_num_consistent()),
        ] {
            if works {
                mask |= flag.bit_value();
            } else {
                debug!(target: OPS_TARGET, flag = %flag, "capability probe failed");
            }
        }
        AppOpsMask::new(mask)
    }

    /// Every op resolves to a default mode.
    fn op_to_default_mode_works(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|entry| entry.default_mode.is_some())
    }

    /// Every op's switch refers to an op present in the table.
    fn op_to_switch_works(&self) -> bool {
        let ids: HashSet<u32> = self.entries.iter().map(|entry| entry.id).collect();
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|entry| entry.switch.is_some_and(|switch| ids.contains(&switch)))
    }

    /// Every op has a distinct, non-empty name.
    fn op_to_name_works(&self) -> bool {
        let mut seen = HashSet::new();
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|entry| !entry.name.is_empty() && seen.insert(entry.name))
    }

    /// Ids are dense and follow the table order.
    fn op_num_consistent(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(index, entry)| entry.id as usize == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, name: &'static str) -> OpEntry {
        OpEntry {
            id,
            name,
            default_mode: Some(OpMode::Allow),
            switch: Some(0),
        }
    }

    #[test]
    fn builtin_table_advertises_every_capability() {
        let mask = OpTable::builtin().capability_mask();
        for flag in CapabilityFlag::ALL {
            assert!(mask.contains(flag), "builtin table should pass {flag}");
        }
    }

    #[test]
    fn missing_default_mode_clears_only_that_bit() {
        let mut broken = entry(1, "second");
        broken.default_mode = None;
        let table = OpTable::from_entries(vec![entry(0, "first"), broken]);
        let mask = table.capability_mask();
        assert!(!mask.contains(CapabilityFlag::OpToDefaultMode));
        assert!(mask.contains(CapabilityFlag::OpToSwitch));
        assert!(mask.contains(CapabilityFlag::OpToName));
        assert!(mask.contains(CapabilityFlag::OpNumConsistent));
    }

    #[test]
    fn dangling_switch_clears_the_switch_bit() {
        let mut dangling = entry(1, "second");
        dangling.switch = Some(99);
        let table = OpTable::from_entries(vec![entry(0, "first"), dangling]);
        assert!(!table.capability_mask().contains(CapabilityFlag::OpToSwitch));
    }

    #[test]
    fn duplicate_names_clear_the_name_bit() {
        let table = OpTable::from_entries(vec![entry(0, "same"), entry(1, "same")]);
        assert!(!table.capability_mask().contains(CapabilityFlag::OpToName));
    }

    #[test]
    fn sparse_ids_clear_the_numbering_bit() {
        let table = OpTable::from_entries(vec![entry(0, "first"), entry(2, "third")]);
        let mask = table.capability_mask();
        assert!(!mask.contains(CapabilityFlag::OpNumConsistent));
        assert!(!mask.contains(CapabilityFlag::OpToSwitch));
    }

    #[test]
    fn empty_table_advertises_nothing_but_numbering() {
        let mask = OpTable::from_entries(Vec::new()).capability_mask();
        assert!(!mask.contains(CapabilityFlag::OpToDefaultMode));
        assert!(!mask.contains(CapabilityFlag::OpToName));
        assert!(mask.contains(CapabilityFlag::OpNumConsistent));
    }
}
