//! Domain models for the API.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod session;

pub use account::{Account, AccountView, Address, NewAccount, Profile};
pub use cart::{Cart, CartItemView, CartLine, CartSummary, CartTotals, CartView, RemovedLineSummary};
pub use catalog::{Coupon, CouponKind, Product, ProductKind, Stock, Variation};
pub use order::{
    NewOrder, Order, OrderLine, OrderOwner, OrderPage, OrderSummary, PageRequest, Pagination,
};
pub use session::{AuthContext, IssuedToken, SessionToken, TokenDigest, TokenRecord};
