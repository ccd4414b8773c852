use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::headers::Name;
use crate::net::Address;

/// One replicated shard of the service. The address is the partition's
/// current entry point; leadership changes are discovered through
/// NOT_LEADER redirects, not by mutating the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: u32,
    pub address: Address,
}

impl Partition {
    pub fn new(id: u32, address: impl Into<Address>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

/// Selects the partition owning `name`.
///
/// The hash must agree across processes and platforms so every client
/// resolves a primitive to the same partition; CRC-32C over the bare name
/// component gives a stable, collision-tolerant 32-bit value with no
/// dependence on byte order or locale.
pub fn select<'a>(name: &Name, partitions: &'a [Partition]) -> ClientResult<&'a Partition> {
    if partitions.is_empty() {
        return Err(ClientError::InvalidArgument(
            "partition set is empty".to_string(),
        ));
    }
    let hash = crc32c::crc32c(name.name.as_bytes());
    Ok(&partitions[hash as usize % partitions.len()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::PrimitiveKind;

    fn partitions(n: u32) -> Vec<Partition> {
        (1..=n)
            .map(|id| Partition::new(id, format!("127.0.0.1:{}", 5678 + id)))
            .collect()
    }

    fn name(s: &str) -> Name {
        Name::new("default", "test", PrimitiveKind::Counter, s)
    }

    #[test]
    fn select_is_deterministic() {
        let parts = partitions(7);
        let a = select(&name("events"), &parts).unwrap();
        let b = select(&name("events"), &parts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn select_ignores_namespace_and_kind() {
        let parts = partitions(7);
        let a = select(&name("events"), &parts).unwrap();
        let other = Name::new("prod", "app", PrimitiveKind::Map, "events");
        let b = select(&other, &parts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn select_spreads_names() {
        let parts = partitions(16);
        let mut seen = std::collections::HashSet::new();
        for i in 0..64 {
            let p = select(&name(&format!("primitive-{i}")), &parts).unwrap();
            seen.insert(p.id);
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn select_rejects_empty_set() {
        let err = select(&name("events"), &[]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }
}
