mod common;

use common::Harness;
use storefront_orderservice::{CheckoutError, ErrorKind, models::CartSummary};
use uuid::Uuid;

fn expected_subtotal(summary: &CartSummary) -> i64 {
    summary
        .items
        .iter()
        .map(|line| i64::from(line.quantity) * line.unit_price_cents)
        .sum()
}

#[tokio::test]
async fn session_token_resolves_to_the_same_cart() {
    let h = Harness::new().await;
    let carts = &h.state.carts;

    let (cart, token) = carts.get_or_create(h.tenant_id, None).await.unwrap();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

    let (again, same_token) = carts
        .get_or_create(h.tenant_id, Some(&token))
        .await
        .unwrap();
    assert_eq!(again.id, cart.id);
    assert_eq!(same_token, token);

    let cart_ref = cart.id.to_string();
    let (by_id, _) = carts
        .get_or_create(h.tenant_id, Some(&cart_ref))
        .await
        .unwrap();
    assert_eq!(by_id.id, cart.id);
}

#[tokio::test]
async fn unknown_or_foreign_tokens_get_a_new_cart() {
    let h = Harness::new().await;
    let carts = &h.state.carts;
    let (cart, token) = carts.get_or_create(h.tenant_id, None).await.unwrap();

    let (fresh, fresh_token) = carts
        .get_or_create(h.tenant_id, Some("no-such-session"))
        .await
        .unwrap();
    assert_ne!(fresh.id, cart.id);
    assert_ne!(fresh_token, "no-such-session");

    let (other, _) = carts
        .get_or_create(h.other_tenant_id, Some(&token))
        .await
        .unwrap();
    assert_ne!(other.id, cart.id);
    assert_eq!(other.tenant_id, h.other_tenant_id);
}

#[tokio::test]
async fn adding_the_same_sku_replaces_quantity() {
    let h = Harness::new().await;
    let sku = h.sku("Tee", "TEE", 500, 100).await;
    let cart_id = h.cart(&[]).await;

    h.state
        .carts
        .add_item(h.tenant_id, cart_id, sku, 3)
        .await
        .unwrap();
    let summary = h
        .state
        .carts
        .add_item(h.tenant_id, cart_id, sku, 5)
        .await
        .unwrap();

    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.items[0].quantity, 5);
    assert_eq!(summary.subtotal_cents, 2500);
}

#[tokio::test]
async fn zero_quantity_update_equals_remove() {
    let h = Harness::new().await;
    let tee = h.sku("Tee", "TEE", 500, 100).await;
    let mug = h.sku("Mug", "MUG", 1000, 100).await;

    let updated_cart = h.cart(&[(tee, 2), (mug, 1)]).await;
    let removed_cart = h.cart(&[(tee, 2), (mug, 1)]).await;

    let updated = h
        .state
        .carts
        .update_quantity(h.tenant_id, updated_cart, tee, 0)
        .await
        .unwrap();
    let removed = h
        .state
        .carts
        .remove_item(h.tenant_id, removed_cart, tee)
        .await
        .unwrap();

    assert_eq!(updated.items, removed.items);
    assert_eq!(updated.subtotal_cents, removed.subtotal_cents);
    assert_eq!(updated.item_count, removed.item_count);
    assert_eq!(updated.subtotal_cents, 1000);
}

#[tokio::test]
async fn subtotal_always_matches_lines() {
    let h = Harness::new().await;
    let tee = h.sku("Tee", "TEE", 500, 100).await;
    let mug = h.sku("Mug", "MUG", 1000, 100).await;
    let cap = h.sku("Cap", "CAP", 750, 100).await;
    let cart_id = h.cart(&[]).await;
    let carts = &h.state.carts;

    let mut summaries = vec![
        carts.add_item(h.tenant_id, cart_id, tee, 2).await.unwrap(),
        carts.add_item(h.tenant_id, cart_id, mug, 1).await.unwrap(),
        carts.update_quantity(h.tenant_id, cart_id, tee, 4).await.unwrap(),
        carts.update_quantity(h.tenant_id, cart_id, cap, 3).await.unwrap(),
        carts.remove_item(h.tenant_id, cart_id, mug).await.unwrap(),
        carts.add_item(h.tenant_id, cart_id, mug, 2).await.unwrap(),
    ];
    summaries.push(carts.summary(h.tenant_id, cart_id).await.unwrap());

    for summary in &summaries {
        assert_eq!(summary.subtotal_cents, expected_subtotal(summary));
        assert_eq!(
            summary.item_count,
            summary.items.iter().map(|line| i64::from(line.quantity)).sum::<i64>()
        );
    }
    let last = summaries.last().unwrap();
    assert_eq!(last.subtotal_cents, 4 * 500 + 3 * 750 + 2 * 1000);
    assert_eq!(last.item_count, 9);

    let cleared = carts.clear(h.tenant_id, cart_id).await.unwrap();
    assert!(cleared.items.is_empty());
    assert_eq!(cleared.subtotal_cents, 0);
}

#[tokio::test]
async fn price_is_snapshotted_when_added() {
    let h = Harness::new().await;
    let sku = h.sku("Tee", "TEE", 500, 100).await;
    let cart_id = h.cart(&[(sku, 2)]).await;

    h.set_price(h.tenant_id, sku, 900).await;
    let summary = h.state.carts.summary(h.tenant_id, cart_id).await.unwrap();
    assert_eq!(summary.items[0].unit_price_cents, 500);

    // Setting the line again picks up the current price.
    let summary = h
        .state
        .carts
        .add_item(h.tenant_id, cart_id, sku, 2)
        .await
        .unwrap();
    assert_eq!(summary.items[0].unit_price_cents, 900);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_io() {
    let h = Harness::new().await;
    let sku = h.sku("Tee", "TEE", 500, 100).await;
    let cart_id = h.cart(&[]).await;
    let carts = &h.state.carts;

    let err = carts.add_item(h.tenant_id, cart_id, sku, 0).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidQuantity { quantity: 0 }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = carts
        .update_quantity(h.tenant_id, cart_id, sku, -1)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidQuantity { quantity: -1 }));

    let err = carts
        .add_item(h.tenant_id, Uuid::new_v4(), sku, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::CartNotFound { .. }));
}

#[tokio::test]
async fn catalog_misses_are_typed() {
    let h = Harness::new().await;
    let cart_id = h.cart(&[]).await;
    let carts = &h.state.carts;

    let err = carts
        .add_item(h.tenant_id, cart_id, Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::SkuNotFound { .. }));

    let foreign_sku = h
        .sku_in(h.other_tenant_id, "Tee", "TEE", 500, 10, serde_json::json!([]))
        .await;
    let err = carts
        .add_item(h.tenant_id, cart_id, foreign_sku, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::SkuNotFound { .. }));
}

#[tokio::test]
async fn carts_are_tenant_scoped() {
    let h = Harness::new().await;
    let sku = h.sku("Tee", "TEE", 500, 100).await;
    let cart_id = h.cart(&[(sku, 1)]).await;

    let err = h
        .state
        .carts
        .summary(h.other_tenant_id, cart_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::CartNotFound { .. }));

    let err = h
        .state
        .carts
        .clear(h.other_tenant_id, cart_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::CartNotFound { .. }));
    assert_eq!(
        h.state.carts.summary(h.tenant_id, cart_id).await.unwrap().item_count,
        1
    );
}

#[tokio::test]
async fn converted_cart_is_replaced_on_next_visit() {
    let h = Harness::new().await;
    let sku = h.sku("Tee", "TEE", 500, 100).await;
    let (cart, token) = h.state.carts.get_or_create(h.tenant_id, None).await.unwrap();
    h.state
        .carts
        .add_item(h.tenant_id, cart.id, sku, 1)
        .await
        .unwrap();
    h.pay(h.tenant_id, "pi_done", cart.id, 500, 0, 0).await;
    h.state
        .checkout
        .create_from_payment_reference(h.tenant_id, "pi_done")
        .await
        .unwrap();

    let (next, next_token) = h
        .state
        .carts
        .get_or_create(h.tenant_id, Some(&token))
        .await
        .unwrap();
    assert_ne!(next.id, cart.id);
    assert_ne!(next_token, token);
    assert!(next.is_open());

    let err = h.state.carts.clear(h.tenant_id, cart.id).await.unwrap_err();
    assert!(matches!(err, CheckoutError::CartAlreadyConverted { .. }));
}

#[tokio::test]
async fn attaching_an_unknown_user_fails() {
    let h = Harness::new().await;
    let cart_id = h.cart(&[]).await;

    let err = h
        .state
        .carts
        .attach_user(h.tenant_id, cart_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::CustomerNotFound { .. }));

    let user = h.user("grace@example.com", "Grace").await;
    let cart = h
        .state
        .carts
        .attach_user(h.tenant_id, cart_id, user.id)
        .await
        .unwrap();
    assert_eq!(cart.user_id, Some(user.id));
}
