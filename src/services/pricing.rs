use crate::{
    config::CheckoutSettings,
    entity::{product_variants::Model as VariantModel, products::Model as ProductModel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: i64,
    pub tax_amount: i64,
    pub shipping_charge: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
}

/// Sale price when one is set, otherwise the base price, plus the variant surcharge.
pub fn unit_price(product: &ProductModel, variant: &VariantModel) -> i64 {
    let base = product
        .sale_price
        .filter(|price| *price > 0)
        .unwrap_or(product.base_price);
    base + variant.additional_price
}

/// Basis-point tax rounded half up.
pub fn tax_for(subtotal: i64, rate_bps: i64) -> i64 {
    (subtotal * rate_bps + 5_000) / 10_000
}

pub fn totals(subtotal: i64, settings: &CheckoutSettings) -> Totals {
    let tax_amount = tax_for(subtotal, settings.tax_rate_bps);
    let shipping_charge = if subtotal > settings.free_shipping_threshold {
        0
    } else {
        settings.shipping_charge
    };
    let discount_amount = 0;
    Totals {
        subtotal,
        tax_amount,
        shipping_charge,
        discount_amount,
        total_amount: subtotal + tax_amount + shipping_charge - discount_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn product(base_price: i64, sale_price: Option<i64>) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            name: "Linen Shirt".into(),
            base_price,
            sale_price,
            created_at: Utc::now().into(),
        }
    }

    fn variant(additional_price: i64) -> VariantModel {
        VariantModel {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            sku: "LS-M-BLU".into(),
            size: "M".into(),
            color: Some("Blue".into()),
            stock_quantity: 3,
            additional_price,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn sale_price_wins_over_base_price() {
        assert_eq!(unit_price(&product(1_000, Some(800)), &variant(50)), 850);
        assert_eq!(unit_price(&product(1_000, None), &variant(50)), 1_050);
        assert_eq!(unit_price(&product(1_000, Some(0)), &variant(0)), 1_000);
    }

    #[test]
    fn tax_rounds_half_up() {
        assert_eq!(tax_for(10_000, 1_800), 1_800);
        // 0.18 * 25 = 4.5
        assert_eq!(tax_for(25, 1_800), 5);
        // 0.18 * 24 = 4.32
        assert_eq!(tax_for(24, 1_800), 4);
        assert_eq!(tax_for(0, 1_800), 0);
    }

    #[test]
    fn shipping_is_free_strictly_above_threshold() {
        let settings = CheckoutSettings::default();
        let at = totals(settings.free_shipping_threshold, &settings);
        assert_eq!(at.shipping_charge, settings.shipping_charge);
        let above = totals(settings.free_shipping_threshold + 1, &settings);
        assert_eq!(above.shipping_charge, 0);
    }

    #[test]
    fn total_adds_up() {
        let settings = CheckoutSettings::default();
        let t = totals(50_000, &settings);
        assert_eq!(t.tax_amount, 9_000);
        assert_eq!(t.shipping_charge, 10_000);
        assert_eq!(t.discount_amount, 0);
        assert_eq!(t.total_amount, 69_000);
    }
}
