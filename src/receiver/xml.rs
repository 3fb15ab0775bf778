//! 接收机 WebIf XML 解析（`e2servicelist` / `e2eventlist`）。

use quick_xml::events::Event;
use quick_xml::reader::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEntry {
    pub reference: String,
    pub name: String,
}

impl ServiceEntry {
    /// 频道列表（bouquet）引用以 `1:7:` 开头。
    pub fn is_bouquet(&self) -> bool {
        self.reference.starts_with("1:7:")
    }

    /// 可播放的电视/广播服务；标记与文件夹不算。
    pub fn is_playable(&self) -> bool {
        self.reference.starts_with("1:0:") && self.name != "<n/a>"
    }
}

#[derive(Clone, Copy)]
enum Field {
    Reference,
    Name,
}

pub fn parse_service_list(xml: &str) -> Result<Vec<ServiceEntry>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ServiceEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"e2service" => current = Some(ServiceEntry::default()),
                b"e2servicereference" => field = Some(Field::Reference),
                b"e2servicename" => field = Some(Field::Name),
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    let text = t.unescape()?;
                    match field {
                        Field::Reference => entry.reference.push_str(&text),
                        Field::Name => entry.name.push_str(&text),
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"e2service" => {
                    if let Some(entry) = current.take() {
                        if !entry.reference.is_empty() {
                            entries.push(entry);
                        }
                    }
                }
                b"e2servicereference" | b"e2servicename" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

/// EPG 事件数即 `e2event` 元素个数。
pub fn count_events(xml: &str) -> Result<usize, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut count = 0;
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"e2event" => count += 1,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(count)
}
