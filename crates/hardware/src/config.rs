//! Machine configuration: structural widths, queue depths, and per-opcode
//! execution latencies. Loaded from an optional TOML file and overridable
//! from the command line; falls back to [`Config::default`] otherwise.

use serde::Deserialize;

/// Execution latency, in cycles, for one class of instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Latencies {
    /// Cycles an ALU op spends in execute (ADD, SUB, AND, OR, XOR, CMP, ADDI, ...).
    pub alu: u32,
    /// Cycles a multiply spends in execute.
    pub mul: u32,
    /// Cycles a divide spends in execute.
    pub div: u32,
    /// Cycles LD spends in execute (address generation + memory read).
    pub load: u32,
    /// Cycles ST, STC, LDC, or MOV spend in execute.
    pub store: u32,
    /// Cycles a branch or jump spends in execute (condition evaluation).
    pub branch: u32,
}

impl Default for Latencies {
    fn default() -> Self {
        Self {
            alu: 3,
            mul: 5,
            div: 10,
            load: 5,
            store: 3,
            branch: 3,
        }
    }
}

/// Counts of independent execution units per functional class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UnitCounts {
    /// Number of independent ALUs (handle ALU and MUL ops).
    pub alu: usize,
    /// Number of independent load/store units.
    pub lsu: usize,
    /// Number of independent branch units.
    pub bru: usize,
}

impl Default for UnitCounts {
    fn default() -> Self {
        Self {
            alu: 2,
            lsu: 1,
            bru: 1,
        }
    }
}

/// Static configuration for one simulation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of in-flight instructions the reorder buffer can hold.
    pub rob_capacity: usize,
    /// Number of waiting instructions each reservation station can hold.
    pub rs_depth: usize,
    /// Number of in-flight loads/stores the memory order buffer can hold.
    pub mob_capacity: usize,
    /// Number of addressable words in main memory.
    pub memory_words: usize,
    /// Execution unit counts per class.
    pub units: UnitCounts,
    /// Execution latencies per class.
    pub latencies: Latencies,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rob_capacity: 32,
            rs_depth: 4,
            mob_capacity: 16,
            memory_words: 256,
            units: UnitCounts::default(),
            latencies: Latencies::default(),
        }
    }
}

impl Config {
    /// Parses a configuration from TOML text, falling back to defaults for
    /// any field the document omits.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Parses a configuration from JSON text, falling back to defaults for
    /// any field the document omits. Useful for callers embedding the
    /// simulator (e.g. a bindings layer) that already speak JSON rather
    /// than TOML.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.rob_capacity, 32);
        assert_eq!(cfg.rs_depth, 4);
        assert_eq!(cfg.mob_capacity, 16);
        assert_eq!(cfg.memory_words, 256);
        assert_eq!(cfg.units.alu, 2);
        assert_eq!(cfg.units.lsu, 1);
        assert_eq!(cfg.units.bru, 1);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_from_default() {
        let cfg = Config::from_toml("rob_capacity = 64\n").expect("valid toml");
        assert_eq!(cfg.rob_capacity, 64);
        assert_eq!(cfg.rs_depth, 4);
        assert_eq!(cfg.mob_capacity, 16);
    }

    #[test]
    fn nested_table_overrides_one_latency() {
        let cfg = Config::from_toml("[latencies]\nmul = 7\n").expect("valid toml");
        assert_eq!(cfg.latencies.mul, 7);
        assert_eq!(cfg.latencies.alu, 3);
    }

    #[test]
    fn from_json_parses_a_partial_document() {
        let cfg = Config::from_json(r#"{"rob_capacity": 64, "units": {"alu": 3}}"#).expect("valid json");
        assert_eq!(cfg.rob_capacity, 64);
        assert_eq!(cfg.units.alu, 3);
        assert_eq!(cfg.units.lsu, 1);
    }
}
