use std::sync::Arc;

use crate::config::AppConfig;
use crate::infra::db::Db;
use crate::infra::razorpay::RazorpayClient;
use crate::security::jwt::JwtManager;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub jwt: JwtManager,
    pub razorpay: RazorpayClient,
}

impl AppState {
    pub fn new(
        db: Db,
        config: AppConfig,
        jwt: JwtManager,
        razorpay: RazorpayClient,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            config,
            jwt,
            razorpay,
        })
    }
}
