pub mod cart;
pub mod checkout;
pub mod inventory;
pub mod order_number;
pub mod orders;
pub mod pricing;

pub use cart::CartService;
pub use checkout::OrderAssembler;
pub use inventory::InventoryLedger;
pub use order_number::OrderNumberGenerator;
pub use orders::OrderService;
pub use pricing::{PricingResolver, ResolvedPrice};
