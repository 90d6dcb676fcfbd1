//! Customer context for multi-tenant database operations
//!
//! Every Manifest and canvas painting belongs to one customer; all queries
//! are scoped by `customer_id`.

/// Customer context passed to all database operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomerContext {
    pub customer_id: i32,
}

impl CustomerContext {
    pub fn new(customer_id: i32) -> Self {
        Self { customer_id }
    }

    pub fn customer_id(&self) -> i32 {
        self.customer_id
    }
}

impl std::fmt::Display for CustomerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Customer({})", self.customer_id)
    }
}
