//! Indexer client tests against a mock TzKT-style API

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;

use tezgate::config::{Config, NetworkConfig};
use tezgate::indexer::IndexerClient;
use tezgate::registry::{EndpointKind, EndpointRegistry};
use tezgate::types::{AccountRef, Network};

const TZ1: &str = "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb";
const KT1: &str = "KT1BEqzn5Wx8uJrZNvuS9DVHmLvG9td3fDLi";
const OP_HASH: &str = "oo6JPEAy8VuMRGaFuMmLNFFGdJgiaKfnmT1CpHJfKP3Ye5ZahiP";

fn client_against(url: &str) -> IndexerClient {
    let mut config = Config::default();
    config.networks.insert(
        "testnet".to_string(),
        NetworkConfig {
            rpc: vec!["http://unused.example".to_string()],
            indexer: vec![url.to_string()],
        },
    );
    let registry = Arc::new(EndpointRegistry::from_config(&config).unwrap());
    let endpoint = registry
        .resolve(&Network::parse("testnet").unwrap(), EndpointKind::Indexer)
        .unwrap();
    IndexerClient::new(
        reqwest::Client::new(),
        endpoint,
        registry,
        Duration::from_secs(2),
        Duration::from_secs(60),
    )
}

fn operation_row(id: u64, amount: u64) -> serde_json::Value {
    json!({
        "id": id,
        "type": "transaction",
        "hash": OP_HASH,
        "sender": {"address": TZ1},
        "target": {"address": KT1},
        "amount": amount,
        "status": "applied",
        "timestamp": "2026-08-05T12:00:00Z",
        "level": 1234567
    })
}

#[tokio::test]
async fn operations_paginate_by_cursor() {
    let mut server = mockito::Server::new_async().await;

    let _first_page = server
        .mock("GET", format!("/v1/accounts/{TZ1}/operations").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("type".into(), "transaction".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(json!([operation_row(100, 500), operation_row(99, 700)]).to_string())
        .create_async()
        .await;

    let client = client_against(&server.url());
    let account = AccountRef::parse(TZ1).unwrap();

    let page = client.operations(&account, 2, None).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].amount, Some(500));
    assert_eq!(page.items[0].sender.as_ref().unwrap().address, TZ1);
    // Full page: cursor points at the last row
    assert_eq!(page.next_cursor, Some(99));
    assert!(!page.is_last());
}

#[tokio::test]
async fn repeated_cursor_requests_are_idempotent_and_terminate() {
    let mut server = mockito::Server::new_async().await;

    let _continuation = server
        .mock("GET", format!("/v1/accounts/{TZ1}/operations").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "2".into()),
            Matcher::UrlEncoded("lastId".into(), "99".into()),
        ]))
        .with_status(200)
        .with_body(json!([operation_row(98, 900)]).to_string())
        .expect(2)
        .create_async()
        .await;

    let client = client_against(&server.url());
    let account = AccountRef::parse(TZ1).unwrap();

    let page_a = client.operations(&account, 2, Some(99)).await.unwrap();
    let page_b = client.operations(&account, 2, Some(99)).await.unwrap();

    // Same cursor, same page
    assert_eq!(page_a.items[0].id, page_b.items[0].id);
    // Short page: the sequence is finite
    assert!(page_a.is_last());
}

#[tokio::test]
async fn oversized_limit_rejected_before_any_request() {
    let client = client_against("http://idx.invalid");
    let account = AccountRef::parse(TZ1).unwrap();
    assert!(client.operations(&account, 1000, None).await.is_err());
}

#[tokio::test]
async fn contract_storage_passthrough() {
    let mut server = mockito::Server::new_async().await;

    let _storage = server
        .mock("GET", format!("/v1/contracts/{KT1}/storage").as_str())
        .with_status(200)
        .with_body(json!({"ledger": 12345, "paused": false}).to_string())
        .create_async()
        .await;

    let client = client_against(&server.url());
    let contract = AccountRef::parse(KT1).unwrap();

    let storage = client.contract_storage(&contract).await.unwrap();
    assert_eq!(storage["ledger"], 12345);
    assert_eq!(storage["paused"], false);
}

#[tokio::test]
async fn block_info_by_level_and_head() {
    let mut server = mockito::Server::new_async().await;

    let _block = server
        .mock("GET", "/v1/blocks/1234567")
        .with_status(200)
        .with_body(
            json!({
                "level": 1234567,
                "hash": "BLrZpUGo9SviS2Z8EJSMb1iEuVVMSUQVPYaMBUZnRsusJGrFVCT",
                "timestamp": "2026-08-05T12:00:00Z",
                "proposer": {"address": TZ1}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let _head = server
        .mock("GET", "/v1/head")
        .with_status(200)
        .with_body(json!({"level": 1234570, "timestamp": "2026-08-05T12:01:00Z"}).to_string())
        .create_async()
        .await;

    let client = client_against(&server.url());

    let block = client.block_info(Some(1234567)).await.unwrap();
    assert_eq!(block.level, 1234567);
    assert_eq!(block.proposer.unwrap().address, TZ1);

    let head = client.block_info(None).await.unwrap();
    assert_eq!(head.level, 1234570);
    assert!(head.hash.is_none());
}

#[tokio::test]
async fn absent_operation_within_grace_is_not_failure() {
    let mut server = mockito::Server::new_async().await;

    // The indexer has not ingested the operation yet: empty result, not
    // an error
    let _missing = server
        .mock("GET", format!("/v1/operations/{OP_HASH}").as_str())
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = client_against(&server.url());

    let rows = client.operations_by_hash(OP_HASH).await.unwrap();
    assert!(rows.is_empty());

    // Included moments ago: absence is indexer lag, not a lost operation
    let included_at = chrono::Utc::now() - chrono::Duration::seconds(3);
    assert!(client.absence_within_grace(included_at));

    // Included well past the grace window: absence is meaningful
    let long_ago = chrono::Utc::now() - chrono::Duration::seconds(600);
    assert!(!client.absence_within_grace(long_ago));
}
