//! HTTP session surface tests.

mod common;

use common::{looping_alphabet, xml_attr, xml_value, TestServer};

fn sqlstate(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("x-lob-sqlstate")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn header(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_fetch_stream_and_free_blob() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let session = server.open_session(&client, None).await;
    let data = looping_alphabet(40_000);
    let column_url = format!("{}/data", server.row_url(&session, "blobtbl", 1));

    let response = client
        .put(&column_url)
        .header("x-lob-type", "blob")
        .body(data.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    let response = client
        .put(format!("{}?comp=commit", server.session_url(&session)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client.post(&column_url).send().await.unwrap();
    assert_eq!(response.status(), 201);
    let xml = response.text().await.unwrap();
    let lob = xml_attr(&xml, "Id").unwrap();
    assert_eq!(xml_value(&xml, "Length").as_deref(), Some("40000"));
    assert_eq!(xml_value(&xml, "Storage").as_deref(), Some("file"));

    let response = client
        .get(server.lob_url(&session, &lob))
        .query(&[("pos", "2000"), ("len", "5000")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 206);
    assert_eq!(header(&response, "content-type"), "application/octet-stream");
    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), 5000);
    assert_eq!(&body[..], &data[1999..6999]);

    let response = client.get(server.lob_url(&session, &lob)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "x-lob-length"), "40000");
    assert_eq!(&response.bytes().await.unwrap()[..], &data[..]);

    let response = client
        .get(server.lob_url(&session, &lob))
        .query(&[("pos", i64::MIN.to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(sqlstate(&response), "XJ070");

    let response = client.head(server.lob_url(&session, &lob)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "x-lob-length"), "40000");
    assert_eq!(header(&response, "x-lob-storage"), "file");
    assert_eq!(header(&response, "x-lob-kind"), "blob");

    // Another session cannot update the row while the LOB holds its lock.
    let other = server.open_session(&client, None).await;
    let other_url = format!("{}/data", server.row_url(&other, "blobtbl", 1));
    let response = client.put(&other_url).body("x").send().await.unwrap();
    assert_eq!(response.status(), 409);
    assert_eq!(sqlstate(&response), "40XL1");

    let response = client.delete(server.lob_url(&session, &lob)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let xml = response.text().await.unwrap();
    assert_eq!(xml_value(&xml, "Freed").as_deref(), Some("true"));

    let response = client.get(server.lob_url(&session, &lob)).send().await.unwrap();
    assert_eq!(response.status(), 410);
    assert_eq!(sqlstate(&response), "XJ215");

    let response = client.delete(server.lob_url(&session, &lob)).send().await.unwrap();
    assert_eq!(response.status(), 410);

    let response = client.put(&other_url).body("x").send().await.unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_clob_edit_and_search() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let session = server.open_session(&client, Some("read-committed")).await;

    let response = client
        .post(format!("{}/lobs", server.session_url(&session)))
        .query(&[("kind", "clob")])
        .body("añ€😀b")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let xml = response.text().await.unwrap();
    let lob = xml_attr(&xml, "Id").unwrap();
    assert_eq!(xml_attr(&xml, "Kind").as_deref(), Some("clob"));
    assert_eq!(xml_value(&xml, "Length").as_deref(), Some("5"));
    let url = server.lob_url(&session, &lob);

    let response = client
        .get(&url)
        .query(&[("pos", "2"), ("len", "2")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 206);
    assert_eq!(response.text().await.unwrap(), "ñ€");

    let response = client
        .get(&url)
        .query(&[("comp", "position"), ("pattern", "😀")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(xml_value(&response.text().await.unwrap(), "Found").as_deref(), Some("4"));

    let response = client
        .get(&url)
        .query(&[("comp", "position")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(sqlstate(&response), "XJ072");

    let response = client
        .put(&url)
        .query(&[("pos", "6")])
        .body("!")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "x-lob-written"), "1");

    let response = client
        .put(&url)
        .query(&[("comp", "truncate"), ("len", "3")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(&url)
        .query(&[("comp", "properties")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(xml_value(&response.text().await.unwrap(), "Length").as_deref(), Some("3"));

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "x-lob-length"), "3");
    assert_eq!(response.text().await.unwrap(), "añ€");

    let response = client
        .get(&url)
        .query(&[("pos", "2"), ("len", "3")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 416);
    assert_eq!(sqlstate(&response), "XJ087");
}

#[tokio::test]
async fn test_commit_frees_session_lobs() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let session = server.open_session(&client, Some("repeatable-read")).await;

    let response = client
        .post(format!("{}/lobs", server.session_url(&session)))
        .body(vec![7u8; 10])
        .send()
        .await
        .unwrap();
    let lob = xml_attr(&response.text().await.unwrap(), "Id").unwrap();

    let response = client.get(server.session_url(&session)).send().await.unwrap();
    let xml = response.text().await.unwrap();
    assert_eq!(xml_value(&xml, "Isolation").as_deref(), Some("repeatable-read"));
    assert_eq!(xml_value(&xml, "LobCount").as_deref(), Some("1"));
    assert!(xml_value(&xml, "Transaction").is_some());

    let response = client
        .put(format!("{}?comp=commit", server.session_url(&session)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let xml = response.text().await.unwrap();
    assert!(xml_value(&xml, "Transaction").is_none());
    assert_eq!(xml_value(&xml, "LobCount").as_deref(), Some("0"));

    let response = client
        .get(server.lob_url(&session, &lob))
        .query(&[("comp", "properties")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 410);
    assert_eq!(sqlstate(&response), "XJ215");

    let response = client.head(server.lob_url(&session, &lob)).send().await.unwrap();
    assert_eq!(response.status(), 410);
}

#[tokio::test]
async fn test_unknown_session_and_bad_requests() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client.get(server.session_url("missing")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(sqlstate(&response), "08003");
    assert!(!header(&response, "x-lob-request-id").is_empty());

    let response = client
        .post(server.sessions_url())
        .query(&[("isolation", "chaos")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(sqlstate(&response), "XJ081");

    let session = server.open_session(&client, None).await;
    let response = client
        .get(server.lob_url(&session, "lob-999"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 410);
    assert_eq!(sqlstate(&response), "XJ215");

    let response = client
        .post(format!("{}/data", server.row_url(&session, "blobtbl", 42)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(sqlstate(&response), "02000");

    let response = client.delete(server.session_url(&session)).send().await.unwrap();
    assert_eq!(response.status(), 204);
    let response = client.get(server.session_url(&session)).send().await.unwrap();
    assert_eq!(response.status(), 404);
}
