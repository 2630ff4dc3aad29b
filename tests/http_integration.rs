//! End-to-end tests against a live router
//!
//! Each test binds an ephemeral port, serves a fresh emulator on it and
//! drives both dialects with reqwest.

use std::collections::HashSet;
use std::net::SocketAddr;

use cloudmock::config::Config;
use cloudmock::server::router;
use cloudmock::state::AppState;
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_test::assert_ok;

const PROJECT: &str = "demo";
const ZONE: &str = "us-central1-a";
const REGION: &str = "us-central1";

/// Serve a fresh emulator whose self links point back at the server
async fn spawn() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let config = Config {
        base_url: Some(format!("http://{}/compute/v1", addr)),
        zones: Some(vec![ZONE.to_string(), "us-central1-b".to_string()]),
        ..Config::default()
    };
    let state = AppState::from_config(&config);
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("serve");
    });
    addr
}

/// First `<tag>...</tag>` text in an XML document
fn xml_text(doc: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = doc.find(&open)? + open.len();
    let end = doc[start..].find(&close)? + start;
    Some(doc[start..end].to_string())
}

async fn ec2(client: &reqwest::Client, addr: SocketAddr, params: &[(&str, &str)]) -> (u16, String) {
    let body = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let response = client
        .post(format!("http://{}/", addr))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .expect("request should succeed");
    let status = response.status().as_u16();
    (status, response.text().await.expect("body"))
}

fn compute_url(addr: SocketAddr, rest: &str) -> String {
    format!("http://{}/compute/v1/projects/{}/{}", addr, PROJECT, rest)
}

async fn compute_post(client: &reqwest::Client, url: &str, body: Value) -> (u16, Value) {
    let response = client.post(url).json(&body).send().await.expect("request should succeed");
    let status = response.status().as_u16();
    (status, response.json().await.expect("json"))
}

async fn compute_get(client: &reqwest::Client, url: &str) -> (u16, Value) {
    let response = client.get(url).send().await.expect("request should succeed");
    let status = response.status().as_u16();
    (status, response.json().await.expect("json"))
}

mod aws_tests {
    use super::*;

    #[tokio::test]
    async fn test_vpc_subnet_dependency_cycle() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        let (status, doc) = ec2(&client, addr, &[("Action", "CreateVpc"), ("CidrBlock", "10.0.0.0/16")]).await;
        assert_eq!(status, 200);
        assert!(doc.contains("<CreateVpcResponse"));
        let vpc_id = xml_text(&doc, "vpcId").expect("vpc id");
        assert!(vpc_id.starts_with("vpc-"));

        let (status, doc) = ec2(
            &client,
            addr,
            &[("Action", "CreateSubnet"), ("VpcId", &vpc_id), ("CidrBlock", "10.0.1.0/24")],
        )
        .await;
        assert_eq!(status, 200);
        let subnet_id = xml_text(&doc, "subnetId").expect("subnet id");

        let (status, doc) = ec2(&client, addr, &[("Action", "DeleteVpc"), ("VpcId", &vpc_id)]).await;
        assert_eq!(status, 400);
        assert_eq!(xml_text(&doc, "Code").as_deref(), Some("DependencyViolation"));
        assert!(xml_text(&doc, "RequestID").is_some());

        let (status, _) = ec2(&client, addr, &[("Action", "DeleteSubnet"), ("SubnetId", &subnet_id)]).await;
        assert_eq!(status, 200);
        let (status, doc) = ec2(&client, addr, &[("Action", "DeleteVpc"), ("VpcId", &vpc_id)]).await;
        assert_eq!(status, 200);
        assert_eq!(xml_text(&doc, "return").as_deref(), Some("true"));

        let (status, doc) = ec2(&client, addr, &[("Action", "DescribeVpcs"), ("VpcId.1", &vpc_id)]).await;
        assert_eq!(status, 400);
        assert_eq!(xml_text(&doc, "Code").as_deref(), Some("InvalidVpcID.NotFound"));
    }

    #[tokio::test]
    async fn test_query_string_get_and_missing_action() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        let response = assert_ok!(
            client
                .get(format!("http://{}/?Action=DescribeVpcs", addr))
                .send()
                .await
        );
        assert_eq!(response.status().as_u16(), 200);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        assert_eq!(content_type.as_deref(), Some("text/xml;charset=UTF-8"));
        let doc = assert_ok!(response.text().await);
        assert!(doc.contains("<DescribeVpcsResponse"));

        let (status, doc) = ec2(&client, addr, &[("CidrBlock", "10.0.0.0/16")]).await;
        assert_eq!(status, 400);
        assert_eq!(xml_text(&doc, "Code").as_deref(), Some("MissingParameter"));
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_ids() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        let cidrs: Vec<String> = (0..20).map(|i| format!("10.{}.0.0/16", i)).collect();
        let requests = cidrs.iter().map(|cidr| {
            let client = client.clone();
            async move { ec2(&client, addr, &[("Action", "CreateVpc"), ("CidrBlock", cidr)]).await }
        });
        let results = join_all(requests).await;

        let ids: HashSet<String> = results
            .iter()
            .map(|(status, doc)| {
                assert_eq!(*status, 200);
                xml_text(doc, "vpcId").expect("vpc id")
            })
            .collect();
        assert_eq!(ids.len(), 20);

        let (_, doc) = ec2(&client, addr, &[("Action", "DescribeVpcs")]).await;
        assert_eq!(doc.matches("<vpcId>").count(), 20);
    }
}

mod gcp_tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_returns_done_operation_with_fetchable_target() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        let (status, op) = compute_post(
            &client,
            &compute_url(addr, "global/networks"),
            json!({"name": "vpc-a", "autoCreateSubnetworks": false}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(op["kind"], "compute#operation");
        assert_eq!(op["status"], "DONE");
        assert_eq!(op["operationType"], "insert");

        let target = op["targetLink"].as_str().expect("targetLink");
        let (status, network) = compute_get(&client, target).await;
        assert_eq!(status, 200);
        assert_eq!(network["name"], "vpc-a");
        assert_eq!(network["id"], op["targetId"]);

        let op_link = op["selfLink"].as_str().expect("selfLink");
        let (status, fetched) = compute_get(&client, op_link).await;
        assert_eq!(status, 200);
        assert_eq!(fetched["name"], op["name"]);
    }

    #[tokio::test]
    async fn test_network_pagination_10_10_5() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        for i in 0..25 {
            let (status, _) = compute_post(
                &client,
                &compute_url(addr, "global/networks"),
                json!({"name": format!("net-{:02}", i), "autoCreateSubnetworks": false}),
            )
            .await;
            assert_eq!(status, 200);
        }

        let mut sizes = Vec::new();
        let mut names = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut url = format!("{}?maxResults=10", compute_url(addr, "global/networks"));
            if let Some(t) = &token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(t)));
            }
            let (status, page) = compute_get(&client, &url).await;
            assert_eq!(status, 200);
            let items = page["items"].as_array().cloned().unwrap_or_default();
            sizes.push(items.len());
            names.extend(items.iter().filter_map(|n| n["name"].as_str().map(str::to_string)));
            match page["nextPageToken"].as_str() {
                Some(t) => token = Some(t.to_string()),
                None => break,
            }
        }
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), 25);
    }

    #[tokio::test]
    async fn test_network_in_use_cannot_be_deleted() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        compute_post(
            &client,
            &compute_url(addr, "global/networks"),
            json!({"name": "default", "autoCreateSubnetworks": false}),
        )
        .await;
        let (status, _) = compute_post(
            &client,
            &compute_url(addr, &format!("regions/{}/subnetworks", REGION)),
            json!({"name": "default", "network": "global/networks/default", "ipCidrRange": "10.128.0.0/20"}),
        )
        .await;
        assert_eq!(status, 200);

        let (status, _) = compute_post(
            &client,
            &compute_url(addr, &format!("zones/{}/instances", ZONE)),
            json!({
                "name": "vm-1",
                "machineType": format!("zones/{}/machineTypes/e2-medium", ZONE),
                "disks": [{"boot": true, "initializeParams": {"diskSizeGb": "20"}}],
            }),
        )
        .await;
        assert_eq!(status, 200);

        let (_, vm) = compute_get(&client, &compute_url(addr, &format!("zones/{}/instances/vm-1", ZONE))).await;
        assert_eq!(vm["status"], "RUNNING");
        assert_eq!(vm["networkInterfaces"][0]["networkIP"], "10.128.0.2");

        let response = assert_ok!(
            client
                .delete(compute_url(addr, "global/networks/default"))
                .send()
                .await
        );
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = assert_ok!(response.json().await);
        assert_eq!(body["error"]["status"], "FAILED_PRECONDITION");
    }

    #[tokio::test]
    async fn test_unknown_resource_and_route() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        let (status, body) = compute_get(&client, &compute_url(addr, "global/networks/missing")).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], 404);
        assert_eq!(body["error"]["status"], "NOT_FOUND");

        let (status, body) = compute_get(&client, &compute_url(addr, "global/nothing")).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["status"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_filter_and_page_size() {
        let addr = spawn().await;
        let client = reqwest::Client::new();

        let url = format!("{}?maxResults=-1", compute_url(addr, "global/networks"));
        let (status, body) = compute_get(&client, &url).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");

        let url = format!(
            "{}?filter={}",
            compute_url(addr, "global/networks"),
            urlencoding::encode("name = a OR name = b")
        );
        let (status, _) = compute_get(&client, &url).await;
        assert_eq!(status, 400);
    }
}
