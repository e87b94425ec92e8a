//! Default permission bits carried on tables. Evaluation of these bits against a caller
//! is done by the [`CapabilityChecker`](crate::action::CapabilityChecker) collaborator.

/// Operation bits within one scope.
pub mod op {
    pub const PEEK: i64 = 1;
    pub const READ: i64 = 1 << 1;
    pub const CREATE: i64 = 1 << 2;
    pub const UPDATE: i64 = 1 << 3;
    pub const DELETE: i64 = 1 << 4;
    pub const EXECUTE: i64 = 1 << 5;
    pub const REFER: i64 = 1 << 6;
    pub const ALL: i64 = PEEK | READ | CREATE | UPDATE | DELETE | EXECUTE | REFER;
}

const SCOPE_WIDTH: u32 = 7;

/// Packed guest / group / owner permission bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permission(i64);

impl Permission {
    /// Owner: everything. Group: peek, read, execute. Guest: peek.
    pub const DEFAULT: Permission = Permission::new(
        op::PEEK,
        op::PEEK | op::READ | op::EXECUTE,
        op::ALL,
    );

    /// Audit tables: rows may only be appended.
    pub const CREATE_ONLY: Permission = Permission::new(op::CREATE, op::CREATE, op::CREATE);

    pub const fn new(guest: i64, group: i64, owner: i64) -> Self {
        Permission(guest | (group << SCOPE_WIDTH) | (owner << (2 * SCOPE_WIDTH)))
    }

    pub const fn from_bits(bits: i64) -> Self {
        Permission(bits)
    }

    pub const fn bits(&self) -> i64 {
        self.0
    }

    pub fn guest(&self) -> i64 {
        self.0 & op::ALL
    }

    pub fn group(&self) -> i64 {
        (self.0 >> SCOPE_WIDTH) & op::ALL
    }

    pub fn owner(&self) -> i64 {
        (self.0 >> (2 * SCOPE_WIDTH)) & op::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_unpack() {
        let p = Permission::DEFAULT;
        assert_eq!(p.guest(), op::PEEK);
        assert_eq!(p.group() & op::EXECUTE, op::EXECUTE);
        assert_eq!(p.owner(), op::ALL);
        let audit = Permission::CREATE_ONLY;
        assert_eq!(audit.guest(), op::CREATE);
        assert_eq!(audit.owner() & op::UPDATE, 0);
    }
}
