//! 测试用的模拟接收机：同一端口同时提供 Web 接口与流服务器。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

pub(crate) const BOUQUET: &str =
    "1:7:1:0:0:0:0:0:0:0:FROM BOUQUET \"userbouquet.mytv.tv\" ORDER BY bouquet";
pub(crate) const DAS_ERSTE: &str = "1:0:19:283D:3FB:1:C00000:0:0:0:";
pub(crate) const ARTE: &str = "1:0:19:2B66:3F3:1:C00000:0:0:0:";
pub(crate) const INFO: &str = "1:0:2:6F:1:85:C00000:0:0:0:";
pub(crate) const MAINTENANCE: &str = "1:0:19:EF10:421:1:C00000:0:0:0:";

/// 调谐成功后接收机收集到的事件数。
pub(crate) const EVENTS_AFTER_TUNE: usize = 12;

type EpgTable = Arc<Mutex<HashMap<String, usize>>>;

pub(crate) struct MockReceiver {
    addr: SocketAddr,
    epg: EpgTable,
}

impl MockReceiver {
    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn events(&self, reference: &str) -> usize {
        self.epg
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or(0)
    }
}

pub(crate) fn spawn() -> MockReceiver {
    let epg: EpgTable = Arc::new(Mutex::new(HashMap::from([
        (DAS_ERSTE.to_string(), 0),
        (ARTE.to_string(), 3),
        (INFO.to_string(), 0),
        (MAINTENANCE.to_string(), 0),
    ])));

    let app = Router::new()
        .route("/web/getservices", get(get_services))
        .route("/web/epgservice", get(epg_service))
        .fallback(stream)
        .with_state(Arc::clone(&epg));

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    MockReceiver {
        addr: rx.recv().unwrap(),
        epg,
    }
}

fn service_xml(entries: &[(&str, &str)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<e2servicelist>\n");
    for (reference, name) in entries {
        xml.push_str(&format!(
            "<e2service><e2servicereference>{}</e2servicereference><e2servicename>{}</e2servicename></e2service>\n",
            reference.replace('"', "&quot;"),
            name
        ));
    }
    xml.push_str("</e2servicelist>\n");
    xml
}

async fn get_services(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    let body = match query.get("sRef").map(String::as_str) {
        None => service_xml(&[
            ("1:7:1:0:0:0:0:0:0:0:FROM BOUQUET \"userbouquet.favourites.tv\" ORDER BY bouquet", "Favourites (TV)"),
            (BOUQUET, "MyTV (TV)"),
        ]),
        Some(BOUQUET) => service_xml(&[
            (DAS_ERSTE, "Das Erste HD"),
            ("1:64:1:0:0:0:0:0:0:0::--- Nachrichten ---", "--- Nachrichten ---"),
            (ARTE, "arte HD"),
            (INFO, "Info Kanal"),
            (MAINTENANCE, "Wartung"),
        ]),
        Some(_) => service_xml(&[]),
    };
    ([(header::CONTENT_TYPE, "text/xml; charset=UTF-8")], body)
}

async fn epg_service(
    State(epg): State<EpgTable>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let reference = query.get("sRef").cloned().unwrap_or_default();
    let count = epg.lock().unwrap().get(&reference).copied().unwrap_or(0);
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<e2eventlist>\n");
    for id in 0..count {
        xml.push_str(&format!(
            "<e2event><e2eventid>{}</e2eventid><e2eventservicereference>{}</e2eventservicereference></e2event>\n",
            1000 + id,
            reference
        ));
    }
    xml.push_str("</e2eventlist>\n");
    ([(header::CONTENT_TYPE, "text/xml; charset=UTF-8")], xml)
}

async fn stream(State(epg): State<EpgTable>, uri: Uri) -> Response {
    let reference = urlencoding::decode(uri.path().trim_start_matches('/'))
        .map(|r| r.into_owned())
        .unwrap_or_default();
    match reference.as_str() {
        DAS_ERSTE => {
            epg.lock()
                .unwrap()
                .insert(DAS_ERSTE.to_string(), EVENTS_AFTER_TUNE);
            (
                [(header::CONTENT_TYPE, "video/mp2t")],
                vec![0x47u8; 96 * 1024],
            )
                .into_response()
        }
        INFO => ([(header::CONTENT_TYPE, "text/plain")], vec![b'x'; 1024]).into_response(),
        MAINTENANCE => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
