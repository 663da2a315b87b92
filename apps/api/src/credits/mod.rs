// Prepaid credits: one credit per CV, reserved up front and refunded for CVs that fail.
// Balance changes only happen through ledger, never with ad-hoc SQL in handlers.

pub mod handlers;
pub mod ledger;
