use actix_web::test;
use market_payment_engine::db_types::Role;

use super::helpers::{access_token, bearer, login_token, prepare_env, test_service};
use crate::auth::{TokenIssuer, LOGIN_TOKEN_HEADER};

#[actix_web::test]
async fn health_is_open() {
    let env = prepare_env().await;
    let app = test_service!(&env);
    let req = test::TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn auth_exchanges_a_login_token_for_an_access_token() {
    let env = prepare_env().await;
    let app = test_service!(&env);
    let token = login_token(&env, "cust-1", vec![Role::Customer]);
    let req = test::TestRequest::post().uri("/auth").insert_header((LOGIN_TOKEN_HEADER, token)).to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    let access = String::from_utf8(test::read_body(res).await.to_vec()).unwrap();
    let issuer = TokenIssuer::new(&env.config.jwt_secret, env.config.access_token_ttl);
    let claims = issuer.decode_claims(&access).unwrap();
    assert_eq!(claims.sub, "cust-1");
    assert_eq!(claims.roles, vec![Role::Customer]);
}

#[actix_web::test]
async fn auth_rejects_a_missing_or_forged_login_token() {
    let env = prepare_env().await;
    let app = test_service!(&env);

    let req = test::TestRequest::post().uri("/auth").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 400);

    let req = test::TestRequest::post()
        .uri("/auth")
        .insert_header((LOGIN_TOKEN_HEADER, "not.a.jwt"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 401);
}

#[actix_web::test]
async fn api_routes_require_a_bearer_token() {
    let env = prepare_env().await;
    let app = test_service!(&env);
    let req = test::TestRequest::get().uri("/api/orders").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 400);

    let token = access_token(&env, "cust-1", vec![Role::Customer]);
    let req = test::TestRequest::get().uri("/api/orders").insert_header(bearer(&token)).to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
}
