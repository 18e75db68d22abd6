pub mod admin_service;
pub mod inventory_service;
pub mod order_service;
pub mod payment_service;
pub mod pricing;
pub mod reclamation_service;
pub mod reservation_service;
pub mod stock_service;
pub mod webhook_service;
