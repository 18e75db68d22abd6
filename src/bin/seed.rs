use checkout_core::{
    config::AppConfig,
    db::{create_pool, orm_from_pool, run_migrations},
    middleware::auth::Claims,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

// Stable ids so re-running the seed keeps the same demo buyer.
const DEMO_USER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001);
const DEMO_ADMIN_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0002);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm_from_pool(&pool)).await?;

    let variants = seed_catalog(&pool).await?;
    let address_id = ensure_address(&pool, DEMO_USER_ID).await?;
    fill_cart(&pool, DEMO_USER_ID, &variants).await?;

    println!("Seed completed. Address ID: {address_id}");
    if let Ok(secret) = std::env::var("JWT_SECRET") {
        println!("User token:  {}", token_for(DEMO_USER_ID, "user", &secret)?);
        println!("Admin token: {}", token_for(DEMO_ADMIN_ID, "admin", &secret)?);
    }
    Ok(())
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Uuid>> {
    let catalog = vec![
        ("Linen Shirt", 249_900_i64, Some(199_900_i64), vec![("LS-S-WHT", "S", "White", 12), ("LS-M-BLU", "M", "Blue", 1)]),
        ("Chino Trousers", 189_900, None, vec![("CT-32-KHK", "32", "Khaki", 25)]),
        ("Canvas Sneakers", 299_900, Some(249_900), vec![("CS-9-BLK", "9", "Black", 4)]),
    ];

    let mut variant_ids = Vec::new();
    for (name, base_price, sale_price, variants) in catalog {
        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        let product_id = match existing {
            Some((id,)) => id,
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO products (id, name, base_price, sale_price)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(id)
                .bind(name)
                .bind(base_price)
                .bind(sale_price)
                .execute(pool)
                .await?;
                id
            }
        };

        for (sku, size, color, stock) in variants {
            let (variant_id,): (Uuid,) = sqlx::query_as(
                r#"
                INSERT INTO product_variants (id, product_id, sku, size, color, stock_quantity, additional_price)
                VALUES ($1, $2, $3, $4, $5, $6, 0)
                ON CONFLICT (sku) DO UPDATE SET stock_quantity = EXCLUDED.stock_quantity
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(sku)
            .bind(size)
            .bind(color)
            .bind(stock)
            .fetch_one(pool)
            .await?;
            variant_ids.push(variant_id);
        }
    }

    println!("Seeded {} variants", variant_ids.len());
    Ok(variant_ids)
}

async fn ensure_address(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM addresses WHERE user_id = $1 ORDER BY created_at LIMIT 1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO addresses (id, user_id, full_name, phone, address_line1, city, state, pincode)
        VALUES ($1, $2, 'Demo Buyer', '9000000000', '12 MG Road', 'Bengaluru', 'Karnataka', '560001')
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn fill_cart(pool: &sqlx::PgPool, user_id: Uuid, variants: &[Uuid]) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    for variant_id in variants.iter().take(2) {
        sqlx::query("INSERT INTO cart_items (id, user_id, variant_id, quantity) VALUES ($1, $2, $3, 1)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(variant_id)
            .execute(pool)
            .await?;
    }
    println!("Filled cart for demo user {user_id}");
    Ok(())
}

fn token_for(user_id: Uuid, role: &str, secret: &str) -> anyhow::Result<String> {
    let exp = (chrono::Utc::now() + chrono::TimeDelta::days(7)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp,
    };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}
