// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Task bookkeeping for the staged analysis.
//
// Scheduling is single-threaded and cooperative: the transfer of control
// into a symbol's task is an ordinary recursive call, and the only
// cross-task synchronization is the symbol's published `step`. What lives
// here is the ledger: which declaration belongs to which symbol, which
// ambient state the task must run under, which symbols are mid-advance on
// the call stack (the cycle detector), and which symbols still owe stages
// at termination.
//
// A task captures the ambient analysis state at scheduling time, so that a
// demand-driven advance months of calls later still runs under the mangle
// prefix, `this` type, and scope the declaration was flattened in.

use std::rc::Rc;

use hashbrown::HashMap;

use drift_ast as ast;

use crate::pass::State;
use crate::symbols::{Step, SymbolId};

#[derive(Clone)]
pub struct Task {
    /// Absent for symbols that advance from data the pass holds elsewhere
    /// (modules, template instances).
    pub decl: Option<Rc<ast::Decl>>,
    pub state: State,
}

#[derive(Default)]
pub struct Scheduler {
    tasks: HashMap<SymbolId, Task>,
    /// Symbols whose advance is currently on the call stack, mapped to the
    /// stage being computed. A `require` hitting one of these demands a
    /// stage the stack below cannot deliver: a true cycle.
    in_flight: HashMap<SymbolId, Step>,
    /// Everything ever scheduled, in registration order. `terminate` drives
    /// this list to `Processed`.
    pending: Vec<SymbolId>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler::default()
    }

    /// Register the analysis task for `sym`, capturing the ambient state it
    /// must run under.
    pub fn schedule(&mut self, decl: Rc<ast::Decl>, state: State, sym: SymbolId) {
        self.tasks.insert(
            sym,
            Task {
                decl: Some(decl),
                state,
            },
        );
        self.pending.push(sym);
    }

    /// Register a symbol that advances without a declaration of its own
    /// (modules, template instances).
    pub fn schedule_stateless(&mut self, state: State, sym: SymbolId) {
        self.tasks.insert(sym, Task { decl: None, state });
        self.pending.push(sym);
    }

    pub fn task(&self, sym: SymbolId) -> Option<Task> {
        self.tasks.get(&sym).cloned()
    }

    /// Mark `sym` as advancing toward `step`. Returns `false` when the
    /// symbol is already mid-advance, i.e. the caller found a cycle.
    pub fn begin(&mut self, sym: SymbolId, step: Step) -> bool {
        if self.in_flight.contains_key(&sym) {
            return false;
        }
        self.in_flight.insert(sym, step);
        true
    }

    pub fn finish(&mut self, sym: SymbolId) {
        self.in_flight.remove(&sym);
    }

    pub fn is_in_flight(&self, sym: SymbolId) -> bool {
        self.in_flight.contains_key(&sym)
    }

    /// Drain the registration-ordered work list. New work may be scheduled
    /// while the drained list is processed; the caller loops until this
    /// comes back empty.
    pub fn take_pending(&mut self) -> Vec<SymbolId> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
