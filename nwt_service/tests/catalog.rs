#[macro_use]
mod support;

use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use serde_json::{Value, json};
use support::{as_user, assert_failure, test_state};

fn new_creator(name: &str) -> TestRequest {
    TestRequest::post().uri("/creators").set_json(json!({
        "name": name,
        "bio": "Draws on weekends",
        "walletAddress": "0x52908400098527886E0F7030069857D2E4169EE7"
    }))
}

fn id_of(body: &Value) -> i64 {
    body["data"]["id"].as_i64().unwrap()
}

#[actix_web::test]
async fn creator_lifecycle() {
    let state = test_state().await;
    let app = init_app!(state);

    let (status, body) = call!(app, as_user(new_creator("Ink Studio"), "alice"));
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["userId"], "alice");
    let creator_id = id_of(&body);

    let (status, body) = call!(app, as_user(new_creator("Second profile"), "alice"));
    assert_eq!(status, StatusCode::CONFLICT);
    assert_failure(&body);

    let (status, body) = call!(
        app,
        TestRequest::get().uri(&format!("/creators/{}", creator_id))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Ink Studio");

    let (status, body) = call!(
        app,
        as_user(
            TestRequest::put()
                .uri(&format!("/creators/{}", creator_id))
                .set_json(json!({ "bio": "Full time now" })),
            "alice"
        )
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["bio"], "Full time now");
    assert_eq!(body["data"]["name"], "Ink Studio");

    let (status, body) = call!(
        app,
        as_user(
            TestRequest::put()
                .uri(&format!("/creators/{}", creator_id))
                .set_json(json!({ "name": "Stolen" })),
            "mallory"
        )
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_failure(&body);

    call!(app, as_user(new_creator("Pencil Co"), "bob"));
    let (status, body) = call!(app, TestRequest::get().uri("/creators?limit=1"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn creator_validation_and_lookup_errors() {
    let state = test_state().await;
    let app = init_app!(state);

    let (status, body) = call!(app, as_user(new_creator(""), "alice"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body);

    let (status, _) = call!(
        app,
        as_user(
            TestRequest::post()
                .uri("/creators")
                .set_json(json!({ "name": "Ok", "walletAddress": "nope" })),
            "alice"
        )
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call!(app, TestRequest::get().uri("/creators/999"));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_failure(&body);

    let (status, body) = call!(app, TestRequest::get().uri("/creators/abc"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body);
}

#[actix_web::test]
async fn comics_belong_to_their_creator() {
    let state = test_state().await;
    let app = init_app!(state);

    let (_, body) = call!(app, as_user(new_creator("Ink Studio"), "alice"));
    let creator_id = id_of(&body);

    let new_comic = json!({
        "creatorId": creator_id,
        "title": "Issue #1",
        "genre": "noir",
        "priceNwt": "2.5"
    });

    let (status, body) = call!(
        app,
        as_user(
            TestRequest::post().uri("/comics").set_json(new_comic.clone()),
            "mallory"
        )
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_failure(&body);

    let (status, body) = call!(
        app,
        as_user(
            TestRequest::post().uri("/comics").set_json(new_comic),
            "alice"
        )
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["priceNwt"], "2.50000000");
    let comic_id = id_of(&body);

    let (status, body) = call!(
        app,
        as_user(
            TestRequest::put()
                .uri(&format!("/comics/{}", comic_id))
                .set_json(json!({ "status": "published" })),
            "alice"
        )
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "published");
    assert_eq!(body["data"]["title"], "Issue #1");

    let (status, _) = call!(
        app,
        as_user(
            TestRequest::put()
                .uri(&format!("/comics/{}", comic_id))
                .set_json(json!({ "title": "Mine now" })),
            "mallory"
        )
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call!(
        app,
        TestRequest::get().uri(&format!("/comics?creatorId={}&status=published", creator_id))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = call!(app, TestRequest::get().uri("/comics?status=draft"));
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = call!(app, TestRequest::get().uri("/comics/4242"));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn comic_for_unknown_creator_is_not_found() {
    let state = test_state().await;
    let app = init_app!(state);

    let (status, body) = call!(
        app,
        as_user(
            TestRequest::post()
                .uri("/comics")
                .set_json(json!({ "creatorId": 77, "title": "Orphan" })),
            "alice"
        )
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_failure(&body);
}
