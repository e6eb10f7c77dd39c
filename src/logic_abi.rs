//! Function descriptors for the per-application "logic" contract. Only
//! `pure`/`view` functions may be driven optimistically or queued
//! (spec §6.2); `normal` accepts any mutability.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutability {
    Pure,
    View,
    Other,
}

impl Mutability {
    pub fn allows_optimistic(self) -> bool {
        matches!(self, Mutability::Pure | Mutability::View)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub sighash: [u8; 4],
    pub mutability: Mutability,
}

/// The set of functions an application exposes on its logic contract.
/// The operator facade (`operator.rs`) consults this to reject
/// `optimistic`/`queue` calls against non-pure/view functions.
#[derive(Debug, Clone, Default)]
pub struct LogicAbi {
    functions: Vec<FunctionDescriptor>,
}

impl LogicAbi {
    pub fn new(functions: Vec<FunctionDescriptor>) -> Self {
        Self { functions }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_by_sighash(&self, sighash: [u8; 4]) -> Option<&FunctionDescriptor> {
        self.functions.iter().find(|f| f.sighash == sighash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_and_view_allow_optimistic_but_other_does_not() {
        assert!(Mutability::Pure.allows_optimistic());
        assert!(Mutability::View.allows_optimistic());
        assert!(!Mutability::Other.allows_optimistic());
    }

    #[test]
    fn lookup_by_name_and_sighash() {
        let abi = LogicAbi::new(vec![FunctionDescriptor {
            name: "transfer".into(),
            sighash: [0x01, 0x02, 0x03, 0x04],
            mutability: Mutability::Pure,
        }]);
        assert!(abi.get("transfer").is_some());
        assert!(abi.get_by_sighash([0x01, 0x02, 0x03, 0x04]).is_some());
        assert!(abi.get("nope").is_none());
    }
}
