// quill-vm - Per-PC debug metadata and error trace formatting
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Per-PC debug metadata.
//!
//! The compiler records, for every emitted instruction, the namespace,
//! module, node kind, access namespace, identifier and source position it
//! came from. Names are interned on first use so the table stores small
//! indices. The VM reads the table when building error messages and stack
//! traces, and rewrites call-site entries with the resolved callee.

use quill_core::constants::DEFAULT_NAMESPACE;

/// The resolved debug information of one instruction.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub module_ns: String,
    pub module: String,
    pub kind: String,
    pub access_ns: String,
    pub identifier: String,
    pub row: usize,
    pub col: usize,
}

impl DebugInfo {
    pub fn new(
        module_ns: impl Into<String>,
        module: impl Into<String>,
        kind: impl Into<String>,
        identifier: impl Into<String>,
        row: usize,
        col: usize,
    ) -> Self {
        DebugInfo {
            module_ns: module_ns.into(),
            module: module.into(),
            kind: kind.into(),
            access_ns: String::new(),
            identifier: identifier.into(),
            row,
            col,
        }
    }

    /// `ErrorKind: message` followed by the location tail.
    pub fn build_error_message(&self, error_kind: &str, error: &str) -> String {
        format!("{}: {}{}", error_kind, error, self.build_error_tail())
    }

    /// `\n at <kind|identifier> (<ns::module>:<row>:<col>)`.
    pub fn build_error_tail(&self) -> String {
        let mut tail = String::from("\n at ");

        if self.identifier.is_empty() {
            tail.push_str(&self.kind);
        } else {
            tail.push_str(&self.identifier);
        }

        tail.push_str(" (");
        if self.module_ns != DEFAULT_NAMESPACE && !self.module_ns.is_empty() {
            tail.push_str(&self.module_ns);
            tail.push_str("::");
        }
        tail.push_str(&self.module);
        tail.push(':');
        tail.push_str(&self.row.to_string());
        tail.push(':');
        tail.push_str(&self.col.to_string());
        tail.push(')');

        tail
    }
}

/// One interned table entry.
#[derive(Debug, Clone, Copy, Default)]
struct DebugEntry {
    ns_ix: usize,
    module_ix: usize,
    kind_ix: usize,
    access_ns_ix: usize,
    identifier_ix: usize,
    row: usize,
    col: usize,
}

/// PC-indexed debug table with interned names.
#[derive(Debug, Default)]
pub struct DebugTable {
    namespaces: Vec<String>,
    modules: Vec<String>,
    kinds: Vec<String>,
    identifiers: Vec<String>,
    entries: Vec<DebugEntry>,
}

fn intern(pool: &mut Vec<String>, name: &str) -> usize {
    if let Some(ix) = pool.iter().position(|n| n == name) {
        return ix;
    }
    pool.push(name.to_string());
    pool.len() - 1
}

impl DebugTable {
    pub fn new() -> Self {
        DebugTable::default()
    }

    /// Record the entry for the instruction at `pc`. Entries are recorded
    /// in emission order; gaps are filled with the previous entry.
    pub fn record(&mut self, pc: usize, info: &DebugInfo) {
        let entry = DebugEntry {
            ns_ix: intern(&mut self.namespaces, &info.module_ns),
            module_ix: intern(&mut self.modules, &info.module),
            kind_ix: intern(&mut self.kinds, &info.kind),
            access_ns_ix: intern(&mut self.namespaces, &info.access_ns),
            identifier_ix: intern(&mut self.identifiers, &info.identifier),
            row: info.row,
            col: info.col,
        };
        if pc < self.entries.len() {
            self.entries[pc] = entry;
        } else {
            let fill = self.entries.last().copied().unwrap_or_default();
            while self.entries.len() < pc {
                self.entries.push(fill);
            }
            self.entries.push(entry);
        }
    }

    /// Resolve the entry at `pc` back into names.
    pub fn info_at(&self, pc: usize) -> DebugInfo {
        let Some(entry) = self.entries.get(pc).copied() else {
            return DebugInfo::default();
        };
        let name = |pool: &Vec<String>, ix: usize| pool.get(ix).cloned().unwrap_or_default();
        DebugInfo {
            module_ns: name(&self.namespaces, entry.ns_ix),
            module: name(&self.modules, entry.module_ix),
            kind: name(&self.kinds, entry.kind_ix),
            access_ns: name(&self.namespaces, entry.access_ns_ix),
            identifier: name(&self.identifiers, entry.identifier_ix),
            row: entry.row,
            col: entry.col,
        }
    }

    /// Rewrite a call-site entry with the resolved callee so stack traces
    /// name what actually ran.
    pub fn set_call_site(&mut self, pc: usize, callee_ns: &str, label: &str, row: usize, col: usize) {
        if pc >= self.entries.len() {
            return;
        }
        let access_ns_ix = intern(&mut self.namespaces, callee_ns);
        let identifier_ix = intern(&mut self.identifiers, label);
        let kind_ix = intern(&mut self.kinds, "call");
        let entry = &mut self.entries[pc];
        entry.access_ns_ix = access_ns_ix;
        entry.identifier_ix = identifier_ix;
        entry.kind_ix = kind_ix;
        entry.row = row;
        entry.col = col;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_resolve() {
        let mut table = DebugTable::new();
        let info = DebugInfo::new("main_ns", "main", "declaration", "x", 3, 7);
        table.record(0, &info);

        let resolved = table.info_at(0);
        assert_eq!(resolved.module, "main");
        assert_eq!(resolved.identifier, "x");
        assert_eq!(resolved.row, 3);
    }

    #[test]
    fn test_gap_fill_uses_previous_entry() {
        let mut table = DebugTable::new();
        table.record(0, &DebugInfo::new("ns", "m", "if", "", 1, 1));
        table.record(4, &DebugInfo::new("ns", "m", "return", "", 9, 2));

        assert_eq!(table.info_at(2).row, 1);
        assert_eq!(table.info_at(4).row, 9);
    }

    #[test]
    fn test_error_tail_format() {
        let info = DebugInfo::new("app", "main", "function-call", "add", 12, 4);
        assert_eq!(info.build_error_tail(), "\n at add (app::main:12:4)");

        let info = DebugInfo::new(DEFAULT_NAMESPACE, "main", "throw", "", 2, 1);
        assert_eq!(info.build_error_tail(), "\n at throw (main:2:1)");
    }
}
