use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewItem, OrderItem},
};

pub async fn insert_items(
    order_pk: i64,
    items: &[NewItem],
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    for item in items {
        sqlx::query(
            r#"
                INSERT INTO order_items (
                    order_pk, description, quantity, weight_grams, length_cm, width_cm, height_cm, fragile
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order_pk)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.weight_grams)
        .bind(item.length_cm)
        .bind(item.width_cm)
        .bind(item.height_cm)
        .bind(item.fragile)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_items(order_pk: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, SqliteDatabaseError> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
            SELECT id, order_pk, description, quantity, weight_grams, length_cm, width_cm, height_cm, fragile
            FROM order_items WHERE order_pk = $1 ORDER BY id ASC
        "#,
    )
    .bind(order_pk)
    .fetch_all(conn)
    .await?;
    Ok(items)
}
