//! 服务目录客户端：通过接收机 Web 接口查找频道列表并统计 EPG。

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ReceiverAddress;
use super::xml::{self, ServiceEntry};
use crate::base_system::interrupt::{CancelToken, Cancelled};
use crate::refresh::models::ServiceCandidate;
use crate::refresh::orchestrator::EpgSource;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("request {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid XML from {url}: {source}")]
    Xml {
        url: String,
        #[source]
        source: quick_xml::Error,
    },
    #[error("bouquet {0:?} not found")]
    BouquetNotFound(String),
    #[error("scan cancelled")]
    Cancelled,
}

impl From<Cancelled> for DirectoryError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// 一次频道列表扫描的结果。
#[derive(Debug, Clone, Default)]
pub struct DirectoryScan {
    pub bouquet_name: String,
    pub total_entries: usize,
    pub playable: usize,
    pub with_epg: usize,
    pub candidates: Vec<ServiceCandidate>,
}

impl DirectoryScan {
    /// 标记、文件夹等非服务条目数。
    pub fn other_entries(&self) -> usize {
        self.total_entries - self.playable
    }
}

pub struct DirectoryClient {
    client: Client,
    address: ReceiverAddress,
}

impl DirectoryClient {
    pub fn new(address: ReceiverAddress, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("text/xml, */*"));

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, address })
    }

    fn get_text(&self, path: &str) -> Result<(String, String), DirectoryError> {
        let url = self.address.control_url(path);
        debug!("GET {}", url);
        let text = self
            .client
            .get(&url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|source| DirectoryError::Request {
                url: url.clone(),
                source,
            })?;
        Ok((url, text))
    }

    /// `None` 列出顶层频道列表，`Some(ref)` 列出该列表内的条目。
    pub fn list_services(&self, parent: Option<&str>) -> Result<Vec<ServiceEntry>, DirectoryError> {
        let path = match parent {
            Some(reference) => format!(
                "/web/getservices?sRef={}",
                urlencoding::encode(reference)
            ),
            None => "/web/getservices".to_string(),
        };
        let (url, text) = self.get_text(&path)?;
        xml::parse_service_list(&text).map_err(|source| DirectoryError::Xml { url, source })
    }

    pub fn list_bouquets(&self) -> Result<Vec<ServiceEntry>, DirectoryError> {
        let mut entries = self.list_services(None)?;
        entries.retain(ServiceEntry::is_bouquet);
        Ok(entries)
    }

    /// 名称包含 `name`（不区分大小写）的第一个频道列表。
    pub fn find_bouquet(&self, name: &str) -> Result<ServiceEntry, DirectoryError> {
        let needle = name.to_lowercase();
        self.list_bouquets()?
            .into_iter()
            .find(|entry| entry.name.to_lowercase().contains(&needle))
            .ok_or_else(|| DirectoryError::BouquetNotFound(name.to_string()))
    }

    pub fn event_count(&self, reference: &str) -> Result<usize, DirectoryError> {
        let path = format!("/web/epgservice?sRef={}", urlencoding::encode(reference));
        let (url, text) = self.get_text(&path)?;
        xml::count_events(&text).map_err(|source| DirectoryError::Xml { url, source })
    }

    /// 扫描频道列表，事件数不超过 `max_events` 的服务即为待刷新候选。
    ///
    /// 单个服务的 EPG 查询失败按 0 个事件处理；列表本身查不到则整体失败。
    /// 每次 EPG 查询前检查 `cancel`。
    pub fn scan(
        &self,
        bouquet_name: &str,
        max_events: usize,
        cancel: &CancelToken,
    ) -> Result<DirectoryScan, DirectoryError> {
        let bouquet = self.find_bouquet(bouquet_name)?;
        info!("找到频道列表: {}", bouquet.name);

        let entries = self.list_services(Some(&bouquet.reference))?;
        let mut scan = DirectoryScan {
            bouquet_name: bouquet.name,
            total_entries: entries.len(),
            ..DirectoryScan::default()
        };
        info!("频道列表共 {} 个条目", scan.total_entries);

        for entry in entries.into_iter().filter(ServiceEntry::is_playable) {
            cancel.check()?;
            scan.playable += 1;
            let events = self.event_count(&entry.reference).unwrap_or_else(|err| {
                warn!("{}: EPG 查询失败，按 0 处理: {}", entry.name, err);
                0
            });

            if events <= max_events {
                info!("需要刷新: {} ({} 个事件)", entry.name, events);
                scan.candidates.push(ServiceCandidate {
                    reference: entry.reference,
                    display_name: entry.name,
                    current_event_count: events,
                });
            } else {
                scan.with_epg += 1;
                if scan.with_epg % 20 == 0 {
                    debug!("已分析 {} 个有 EPG 的服务", scan.with_epg);
                }
            }
        }

        Ok(scan)
    }
}

impl EpgSource for DirectoryClient {
    type Error = DirectoryError;

    fn event_count(&self, reference: &str) -> Result<usize, Self::Error> {
        DirectoryClient::event_count(self, reference)
    }
}
