//! DOCX 텍스트 추출 모듈
//!
//! ZIP 컨테이너 안의 `word/document.xml`에서 `w:t` 런을 모으고,
//! 문단(`w:p`)이 끝날 때마다 줄바꿈을 넣습니다. 페이지 정보가 없으므로 1페이지로 취급합니다.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, RiaError};

const DOCUMENT_XML: &str = "word/document.xml";
/// ZIP 엔트리 최대 해제 크기 (zip bomb 방지)
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// DOCX 바이트에서 본문 텍스트 추출
pub fn extract_docx_text(locator: &str, bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| RiaError::source_read(locator, e))?;

    let entry = archive
        .by_name(DOCUMENT_XML)
        .map_err(|e| RiaError::source_read(locator, format!("{}: {}", DOCUMENT_XML, e)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| RiaError::source_read(locator, e))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(RiaError::source_read(
            locator,
            format!("{} exceeds size limit", DOCUMENT_XML),
        ));
    }

    paragraphs_from_xml(&xml).map_err(|reason| RiaError::source_read(locator, reason))
}

/// `w:t` 텍스트를 문단 단위로 연결
fn paragraphs_from_xml(xml: &[u8]) -> std::result::Result<String, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"p" => out.push('\n'),
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim().to_string())
}

// ============================================================================
// Tests
// ============================================================================
