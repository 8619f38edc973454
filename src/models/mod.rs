pub mod order;
pub mod reservation;
pub mod seat;
pub mod showing;

pub use order::{NewOrder, Order, OrderHistory, OrderRequest, OrderSeatInput};
pub use reservation::{ReservationStatus, SeatReservation};
pub use seat::{Seat, SeatType};
pub use showing::Showing;
