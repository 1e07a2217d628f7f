//! Stateful fake for the nf_tables transport.
//!
//! Tracks actual state (sets with their elements, chains with their rules,
//! queued flushes) rather than only verifying call sequences, and records
//! every call so tests can assert on which kernel objects were touched.
//!
//! The state lives behind `Arc<Mutex<_>>` so a test keeps a handle after the
//! fake has been moved into a `ConnectionManager`.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::table::{ChainRef, SetRef, TableRef};

use super::{NfTablesOps, SetElement};

const ENOENT: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetSet(String),
    GetSetElements(String),
    ListRules(String),
    FlushChain(String),
    Commit,
}

impl Call {
    fn op(&self) -> &'static str {
        match self {
            Call::GetSet(_) => "get_set",
            Call::GetSetElements(_) => "get_set_elements",
            Call::ListRules(_) => "list_rules",
            Call::FlushChain(_) => "flush_chain",
            Call::Commit => "commit",
        }
    }
}

#[derive(Debug, Default)]
pub struct NfTablesState {
    pub sets: HashMap<(TableRef, String), Vec<SetElement>>,
    pub chains: HashMap<ChainRef, Vec<u64>>,
    pub pending: Vec<ChainRef>,
    pub calls: Vec<Call>,
    /// Map of operation name -> error message. If set, the operation will fail.
    pub fail_on: HashMap<String, String>,
    /// Highest number of operations observed in progress at the same time.
    pub max_in_flight: usize,
    in_flight: usize,
}

impl NfTablesState {
    pub fn with_set(mut self, table: &TableRef, name: &str, elements: Vec<SetElement>) -> Self {
        self.sets.insert((table.clone(), name.to_string()), elements);
        self
    }

    pub fn with_chain(mut self, chain: ChainRef, rules: Vec<u64>) -> Self {
        self.chains.insert(chain, rules);
        self
    }

    pub fn fail(mut self, op: &str, msg: &str) -> Self {
        self.fail_on.insert(op.to_string(), msg.to_string());
        self
    }

    fn check_fail(&self, op: &str) -> Result<(), Error> {
        if let Some(msg) = self.fail_on.get(op) {
            Err(Error::netlink(op, io::Error::other(msg.clone())))
        } else {
            Ok(())
        }
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

#[derive(Clone)]
pub struct MockNfTablesOps {
    pub state: Arc<Mutex<NfTablesState>>,
    /// Time each operation spends "on the wire", to widen race windows.
    latency: Option<Duration>,
}

struct InFlight<'a> {
    state: &'a Mutex<NfTablesState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().unwrap().in_flight -= 1;
    }
}

impl MockNfTablesOps {
    pub fn new() -> Self {
        Self::with_state(NfTablesState::default())
    }

    pub fn with_state(state: NfTablesState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn enter(&self, call: Call) -> Result<InFlight<'_>, Error> {
        {
            let mut s = self.state.lock().unwrap();
            let op = call.op();
            s.calls.push(call);
            s.check_fail(op)?;
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
        }
        let guard = InFlight { state: &self.state };
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        Ok(guard)
    }
}

impl NfTablesOps for MockNfTablesOps {
    fn get_set(&mut self, table: &TableRef, name: &str) -> Result<Option<SetRef>, Error> {
        let _op = self.enter(Call::GetSet(name.to_string()))?;
        let s = self.state.lock().unwrap();
        Ok(s.sets.contains_key(&(table.clone(), name.to_string())).then(|| SetRef {
            table: table.clone(),
            name: name.to_string(),
        }))
    }

    fn get_set_elements(&mut self, set: &SetRef) -> Result<Vec<SetElement>, Error> {
        let _op = self.enter(Call::GetSetElements(set.name.clone()))?;
        let s = self.state.lock().unwrap();
        s.sets
            .get(&(set.table.clone(), set.name.clone()))
            .cloned()
            .ok_or_else(|| Error::SetNotFound {
                table: set.table.clone(),
                set: set.name.clone(),
            })
    }

    fn list_rules(&mut self, chain: &ChainRef) -> Result<Vec<u64>, Error> {
        let _op = self.enter(Call::ListRules(chain.name.clone()))?;
        let s = self.state.lock().unwrap();
        s.chains.get(chain).cloned().ok_or_else(|| {
            Error::netlink(
                format!("listing rules of chain {}", chain.name),
                io::Error::from_raw_os_error(ENOENT),
            )
        })
    }

    fn flush_chain(&mut self, chain: &ChainRef) -> Result<(), Error> {
        let _op = self.enter(Call::FlushChain(chain.name.clone()))?;
        self.state.lock().unwrap().pending.push(chain.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending);
        let _op = self.enter(Call::Commit)?;
        let mut s = self.state.lock().unwrap();
        // all-or-nothing, as the kernel applies a batch
        if pending.iter().any(|chain| !s.chains.contains_key(chain)) {
            return Err(Error::netlink(
                "committing batch",
                io::Error::from_raw_os_error(ENOENT),
            ));
        }
        for chain in &pending {
            if let Some(rules) = s.chains.get_mut(chain) {
                rules.clear();
            }
        }
        Ok(())
    }
}
