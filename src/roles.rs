//! Role membership and the fixed custody stage order
use crate::error::CustodyError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[n(0)]
    Producer,
    #[n(1)]
    Transporter,
    #[n(2)]
    Distributor,
    #[n(3)]
    Retailer,
}

impl Role {
    /// The stage a batch moves to when its current custodian hands it over.
    /// Retailer is terminal, custody ends there via inspection.
    pub fn next(self) -> Option<Role> {
        match self {
            Role::Producer => Some(Role::Transporter),
            Role::Transporter => Some(Role::Distributor),
            Role::Distributor => Some(Role::Retailer),
            Role::Retailer => None,
        }
    }
}

// Single record in the ledger. The admin is fixed when the ledger is
// bootstrapped; membership lists only ever grow.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct RoleRegistry {
    #[n(0)]
    admin: String,
    #[n(1)]
    producers: Vec<String>,
    #[n(2)]
    transporters: Vec<String>,
    #[n(3)]
    distributors: Vec<String>,
    #[n(4)]
    retailers: Vec<String>,
}

impl RoleRegistry {
    pub fn new(admin: String) -> Self {
        Self {
            admin,
            producers: vec![],
            transporters: vec![],
            distributors: vec![],
            retailers: vec![],
        }
    }

    pub fn admin(&self) -> &str {
        &self.admin
    }

    fn members(&self, role: Role) -> &Vec<String> {
        match role {
            Role::Producer => &self.producers,
            Role::Transporter => &self.transporters,
            Role::Distributor => &self.distributors,
            Role::Retailer => &self.retailers,
        }
    }

    /// Grant `target` the given role. Admin only. Re-adding an existing
    /// member is a no-op success.
    pub fn register(&mut self, caller: &str, role: Role, target: String) -> Result<(), CustodyError> {
        if caller != self.admin {
            return Err(CustodyError::NotAuthorized);
        }
        let members = match role {
            Role::Producer => &mut self.producers,
            Role::Transporter => &mut self.transporters,
            Role::Distributor => &mut self.distributors,
            Role::Retailer => &mut self.retailers,
        };
        if !members.contains(&target) {
            members.push(target);
        }
        Ok(())
    }

    pub fn is_authorized(&self, identity: &str, role: Role) -> bool {
        self.members(role).iter().any(|m| m == identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_cbor_roundtrip() {
        let mut registry = RoleRegistry::new("admin_1".into());
        registry
            .register("admin_1", Role::Producer, "farm_1".into())
            .unwrap();

        let encoded = minicbor::to_vec(&registry).unwrap();
        let decoded: RoleRegistry = minicbor::decode(&encoded).unwrap();

        assert_eq!(registry, decoded);
    }

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(Role::Producer.next(), Some(Role::Transporter));
        assert_eq!(Role::Transporter.next(), Some(Role::Distributor));
        assert_eq!(Role::Distributor.next(), Some(Role::Retailer));
        assert_eq!(Role::Retailer.next(), None);
    }
}
