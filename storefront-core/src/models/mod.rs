pub mod account;
pub mod product;
pub mod search;

pub use account::{
    normalize_email, CartEntry, CartLine, CartView, ContactMessage, Order, OrderItem, User,
    WishlistEntry, WishlistLine, WishlistView,
};
pub use product::{Product, ProductPage, ProductQuery, ProductSort, Rating};
pub use search::{RankedResult, SearchOutcome};
