//! Object loading, selection and paging against a mocked data service

mod common;

use common::*;
use futures::StreamExt;
use mpx_sdk::blocking::BlockingFactory;
use mpx_sdk::data::Media;
use mpx_sdk::query::{ByFields, Fields, ObjectListQuery, Range, Sort};
use mpx_sdk::{Account, DataObjectFactory, Error, MEDIA_DATA_SERVICE};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn titles(items: &[Value]) -> Vec<&str> {
    items.iter().filter_map(|m| m["title"].as_str()).collect()
}

/// Five media served two per page: 1-2, 3-4, then a short page 5-6
async fn mount_five_media(server: &MockServer) {
    let pages = [
        ("1-2", page(1, 2, vec![media(1, "a"), media(2, "b")], 5)),
        ("3-4", page(3, 2, vec![media(3, "c"), media(4, "d")], 5)),
        ("5-6", page(5, 2, vec![media(5, "e")], 5)),
    ];
    for (range, body) in pages {
        Mock::given(method("GET"))
            .and(path(MEDIA_PATH))
            .and(query_param("range", range))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_load_by_id() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/2602559", MEDIA_PATH)))
        .and(query_param("schema", "1.10"))
        .and(query_param("form", "cjson"))
        .and(query_param("token", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "http://data.media.theplatform.com/media/data/Media/2602559",
            "guid": "guid-1",
            "title": "Most Excellent Video",
            "author": null,
            "added": 1510000000000i64
        })))
        .expect(1)
        .mount(&server)
        .await;

    let factory: DataObjectFactory<Media> = DataObjectFactory::new(MEDIA_DATA_SERVICE, client(&server), resolver(&server));
    let media = factory.load("2602559", None).await.unwrap();

    assert_eq!(media.base.title.as_deref(), Some("Most Excellent Video"));
    assert_eq!(media.base.numeric_id(), Some("2602559"));
    assert!(media.author.is_none());
}

#[tokio::test]
async fn test_load_by_absolute_uri() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;

    Mock::given(method("GET"))
        .and(path("/elsewhere/data/Media/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(media(7, "seven")))
        .expect(1)
        .mount(&server)
        .await;

    let uri = format!("{}/elsewhere/data/Media/7", server.uri());
    let object = media_factory(&server).load(&uri, None).await.unwrap();
    assert_eq!(object["title"], "seven");
}

#[tokio::test]
async fn test_load_missing_object_is_not_found() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/404", MEDIA_PATH)))
        .respond_with(ResponseTemplate::new(404).set_body_json(exception_body(
            404,
            "com.theplatform.data.api.exception.ObjectNotFoundException",
        )))
        .mount(&server)
        .await;

    let err = media_factory(&server).load("404", None).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, Error::Api(_)));
}

#[tokio::test]
async fn test_select_sends_filters_sort_range_and_account() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;

    Mock::given(method("GET"))
        .and(path(MEDIA_PATH))
        .and(query_param("byTitle", "Most Excellent Video"))
        .and(query_param("fields", "id,title"))
        .and(query_param("sort", "added|desc"))
        .and(query_param("range", "1-10"))
        .and(query_param("account", "http://access.auth.theplatform.com/data/Account/42"))
        .and(query_param("schema", "1.10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            1,
            10,
            vec![media(1, "Most Excellent Video")],
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let query = ObjectListQuery::new()
        .add(ByFields::new().field("title", "Most Excellent Video"))
        .add(Fields::new(["id", "title"]))
        .with_sort(Sort::by_desc("added"))
        .with_range(Range::new(1, 10).unwrap());
    let account = Account::new("http://access.auth.theplatform.com/data/Account/42");

    let list = media_factory(&server).select(&query, Some(&account)).await.unwrap();
    assert_eq!(list.entry_count(), 1);
    assert_eq!(list.total_results(), Some(1));
    assert!(!list.has_next());
    assert!(list.next_list().await.unwrap().is_none());
}

#[tokio::test]
async fn test_select_without_account_omits_param_and_fills_page_fields() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;

    Mock::given(method("GET"))
        .and(path(MEDIA_PATH))
        .and(query_param_is_missing("account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startIndex": 1,
            "entries": [media(1, "a"), media(2, "b"), media(3, "c")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = ObjectListQuery::new().with_range(Range::new(1, 3).unwrap());
    let list = media_factory(&server).select(&query, None).await.unwrap();

    assert_eq!(list.items_per_page(), 3);
    assert_eq!(list.entry_count(), 3);
    assert!(list.has_next());
    assert_eq!(list.next_range().unwrap(), Range::new(4, 6).unwrap());
}

#[tokio::test]
async fn test_next_list_walks_pages() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;
    mount_five_media(&server).await;

    let factory = media_factory(&server);
    let query = ObjectListQuery::new().with_range(Range::new(1, 2).unwrap());

    let first = factory.select(&query, None).await.unwrap();
    assert_eq!(
        first.estimated_remaining_ranges(),
        vec![Range::new(3, 4).unwrap(), Range::new(5, 5).unwrap()]
    );

    let second = first.next_list().await.unwrap().unwrap();
    assert_eq!(second.start_index(), 3);
    let third = second.next_list().await.unwrap().unwrap();
    assert_eq!(titles(third.entries()), vec!["e"]);
    assert!(third.next_list().await.unwrap().is_none());
}

#[tokio::test]
async fn test_iterator_yields_every_object_in_order() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;
    mount_five_media(&server).await;

    let query = ObjectListQuery::new().with_range(Range::new(1, 2).unwrap());
    let mut iter = media_factory(&server).iter(query, None);

    let mut seen = Vec::new();
    while let Some(item) = iter.next().await.unwrap() {
        seen.push(item);
    }

    assert_eq!(titles(&seen), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(iter.position(), 5);
    assert_eq!(iter.page(), 2);
    assert!(iter.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_iterator_stops_on_empty_page() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;

    Mock::given(method("GET"))
        .and(path(MEDIA_PATH))
        .and(query_param("range", "1-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1, 2, vec![media(1, "a"), media(2, "b")], 10)))
        .expect(1)
        .mount(&server)
        .await;
    // totalResults claimed more, but the data ran out
    Mock::given(method("GET"))
        .and(path(MEDIA_PATH))
        .and(query_param("range", "3-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(3, 2, vec![], 10)))
        .expect(1)
        .mount(&server)
        .await;

    let query = ObjectListQuery::new().with_range(Range::new(1, 2).unwrap());
    let items = media_factory(&server).iter(query, None).collect_all().await.unwrap();
    assert_eq!(titles(&items), vec!["a", "b"]);
}

#[tokio::test]
async fn test_advance_to_skips_forward_only() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;
    mount_five_media(&server).await;

    let query = ObjectListQuery::new().with_range(Range::new(1, 2).unwrap());
    let mut iter = media_factory(&server).iter(query, None);

    iter.advance_to(3).await.unwrap();
    assert_eq!(iter.next().await.unwrap().unwrap()["title"], "d");

    let err = iter.advance_to(1).await.unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));

    assert_eq!(iter.next().await.unwrap().unwrap()["title"], "e");
}

#[tokio::test]
async fn test_stream_with_limit() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;

    Mock::given(method("GET"))
        .and(path(MEDIA_PATH))
        .and(query_param("range", "1-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1, 2, vec![media(1, "a"), media(2, "b")], 5)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MEDIA_PATH))
        .and(query_param("range", "3-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(3, 2, vec![media(3, "c"), media(4, "d")], 5)))
        .expect(1)
        .mount(&server)
        .await;

    let query = ObjectListQuery::new().with_range(Range::new(1, 2).unwrap());
    let items: Vec<Value> = media_factory(&server)
        .iter(query, None)
        .into_stream()
        .take(3)
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(titles(&items), vec!["a", "b", "c"]);
}

#[test]
fn test_blocking_iterator() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        mount_sign_ins(&server, &["tok-1"]).await;
        mount_five_media(&server).await;
        server
    });

    let factory = BlockingFactory::new(media_factory(&server)).unwrap();
    let query = ObjectListQuery::new().with_range(Range::new(1, 2).unwrap());

    let items: Vec<Value> = factory
        .iter(query, None)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(titles(&items), vec!["a", "b", "c", "d", "e"]);

    drop(factory);
    runtime.block_on(async move { drop(server) });
}
