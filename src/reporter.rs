// src/reporter.rs
// CSV & printable HTML export of a parsed transcript, plus avatar selection.
// Everything here is a pure function of an already-parsed session snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use csv::Writer;
use tracing::info;

use crate::error::FocusError;
use crate::participant::Participant;
use crate::session::SessionSnapshot;
use crate::transcript::{Message, Speaker};

const AVATAR_BASE: &str = "https://api.dicebear.com/9.x";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct Reporter;

impl Reporter {
    /// Spreadsheet-friendly CSV: BOM, then `輪次,參與者,內容` rows.
    pub fn export_csv(messages: &[Message]) -> Result<Vec<u8>, FocusError> {
        if messages.is_empty() {
            return Err(FocusError::EmptyTranscript);
        }

        let mut out = UTF8_BOM.to_vec();
        {
            let mut wtr = Writer::from_writer(&mut out);
            wtr.write_record(["輪次", "參與者", "內容"])?;
            for msg in messages {
                wtr.write_record([
                    msg.round.to_string().as_str(),
                    msg.speaker_label.as_str(),
                    msg.content.as_str(),
                ])?;
            }
            wtr.flush().map_err(|e| FocusError::Export(e.to_string()))?;
        }
        Ok(out)
    }

    pub fn avatar_url(label: &str, speaker: &Speaker, participant: Option<&Participant>) -> String {
        if speaker.is_moderator() {
            return format!("{}/bottts-neutral/svg?seed=Host&backgroundColor=facc15", AVATAR_BASE);
        }

        let mut style = "notionists";
        let mut seed = label.to_string();
        let mut extra = "";

        if let Some(p) = participant {
            seed = p.id.clone();
            // Age groups get a distinct look; checked youngest first.
            if p.has_tag_containing("嬰兒") || p.has_tag_containing("1歲") {
                style = "fun-emoji";
                seed = format!("baby-{}", seed);
            } else if p.has_tag_containing("6歲") || p.has_tag_containing("4歲") {
                seed = format!("child-{}", seed);
            } else if p.has_tag_containing("65歲") {
                seed = format!("elder-{}", seed);
            }
            if p.has_tag_containing("女") {
                extra = "&baseColor=f9c9b6";
            }
        }

        format!(
            "{}/{}/svg?seed={}{}&backgroundColor=transparent",
            AVATAR_BASE,
            style,
            urlencoding::encode(&seed),
            extra
        )
    }

    pub fn export_html(snapshot: &SessionSnapshot, printed_at: DateTime<Utc>) -> Result<String, FocusError> {
        if snapshot.messages.is_empty() {
            return Err(FocusError::EmptyTranscript);
        }

        // 1. Settings summary
        let roster_items: String = snapshot
            .participants
            .iter()
            .map(|p| {
                let tags = if p.tags.is_empty() { "無標籤".to_string() } else { p.tags.join(", ") };
                format!(
                    "<li><span class=\"role-badge\">{}</span>{} <span class=\"tags\">({})</span></li>",
                    escape_html(&p.role),
                    escape_html(&p.name),
                    escape_html(&tags)
                )
            })
            .collect();

        let sub_topic_items: String = if snapshot.settings.sub_topics.is_empty() {
            "<li>自由討論</li>".to_string()
        } else {
            snapshot
                .settings
                .sub_topics
                .iter()
                .map(|s| format!("<li>{}</li>", escape_html(&s.content)))
                .collect()
        };

        // 2. Transcript
        let transcript: String = snapshot
            .messages
            .iter()
            .map(|msg| {
                let participant = msg
                    .speaker
                    .participant_id()
                    .and_then(|id| snapshot.participants.iter().find(|p| p.id == id));
                let host = msg.speaker.is_moderator();
                format!(
                    "<div class=\"message-block\">\
                    <div class=\"avatar-box\"><img src=\"{}\" class=\"avatar-img{}\" /></div>\
                    <div class=\"content-box\">\
                    <div class=\"speaker-header\">{}<span class=\"round-badge\">第 {} 輪</span></div>\
                    <div class=\"text-content{}\">{}</div>\
                    </div></div>\n",
                    escape_html(&Self::avatar_url(&msg.speaker_label, &msg.speaker, participant)),
                    if host { " host-avatar" } else { "" },
                    escape_html(&msg.speaker_label),
                    msg.round,
                    if host { " host-bubble" } else { "" },
                    escape_html(&msg.content)
                )
            })
            .collect();

        // 3. Page
        Ok(format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>焦點座談逐字稿</title>\n\
            <style>{css}</style>\n</head>\n<body>\n\
            <h1>焦點座談模擬報告</h1>\n\
            <div class=\"settings-box\">\n<h2>會議設定摘要</h2>\n<div class=\"grid-info\">\n\
            <div class=\"info-item\"><strong>討論主題：</strong>{topic}</div>\n\
            <div class=\"info-item\"><strong>預計輪數：</strong>{rounds} 輪</div>\n\
            <div class=\"info-item\"><strong>建立時間：</strong>{created}</div>\n\
            <div class=\"info-item\"><strong>列印時間：</strong>{printed}</div>\n</div>\n\
            <div class=\"section-title\">參與者名單</div>\n<ul class=\"tag-list\">{roster}</ul>\n\
            <div class=\"section-title\">待討論子議題</div>\n<ol class=\"subtopic-list\">{subs}</ol>\n</div>\n\
            <div class=\"transcript-title\">--- 對話逐字稿 ---</div>\n\
            <div class=\"transcript\">\n{transcript}</div>\n</body>\n</html>\n",
            css = REPORT_CSS,
            topic = escape_html(&snapshot.settings.topic),
            rounds = snapshot.settings.rounds,
            created = snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            printed = printed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            roster = roster_items,
            subs = sub_topic_items,
            transcript = transcript,
        ))
    }

    /// One log line per run: message counts per speaker and unresolved labels.
    pub fn log_summary(messages: &[Message]) {
        let mut per_speaker: BTreeMap<&str, usize> = BTreeMap::new();
        for msg in messages {
            *per_speaker.entry(msg.speaker_label.as_str()).or_default() += 1;
        }
        let unresolved = messages
            .iter()
            .filter(|m| m.speaker == Speaker::Unresolved)
            .count();
        let rounds = messages.last().map(|m| m.round).unwrap_or(0);

        info!(
            total = messages.len(),
            rounds,
            unresolved,
            speakers = ?per_speaker,
            "transcript summary"
        );
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const REPORT_CSS: &str = "\
@page { size: A4; margin: 1.5cm; }
body { font-family: \"Microsoft JhengHei\", sans-serif; color: #333; max-width: 800px; margin: 0 auto; -webkit-print-color-adjust: exact; print-color-adjust: exact; }
.settings-box { background-color: #f8fafc; border: 1px solid #e2e8f0; border-radius: 8px; padding: 20px; margin-bottom: 30px; font-size: 13px; }
.settings-box h2 { margin-top: 0; border-bottom: 2px solid #333; padding-bottom: 8px; }
.grid-info { display: grid; grid-template-columns: 1fr 1fr; gap: 10px; margin-bottom: 15px; }
.section-title { font-weight: bold; margin-top: 10px; color: #475569; border-bottom: 1px dashed #cbd5e1; padding-bottom: 4px; margin-bottom: 6px; }
.tag-list, .subtopic-list { margin: 5px 0; padding-left: 20px; }
.role-badge { background: #e2e8f0; padding: 2px 6px; border-radius: 4px; font-size: 11px; font-weight: bold; margin-right: 5px; }
.tags { color: #64748b; font-size: 12px; }
.transcript-title { text-align: center; margin-bottom: 20px; font-size: 18px; font-weight: bold; }
.message-block { margin-bottom: 20px; page-break-inside: avoid; display: flex; gap: 15px; }
.avatar-box { width: 50px; display: flex; flex-direction: column; align-items: center; flex-shrink: 0; }
.avatar-img { width: 45px; height: 45px; border-radius: 50%; border: 2px solid #e2e8f0; background-color: #fff; object-fit: cover; }
.host-avatar { border-color: #facc15; }
.content-box { flex: 1; }
.speaker-header { font-size: 14px; font-weight: bold; margin-bottom: 4px; color: #1e293b; display: flex; align-items: center; gap: 8px; }
.round-badge { background: #f1f5f9; color: #64748b; font-size: 10px; padding: 1px 6px; border-radius: 10px; font-weight: normal; }
.text-content { text-align: justify; white-space: pre-wrap; font-size: 14px; line-height: 1.6; padding: 10px 15px; background-color: #fff; border: 1px solid #e2e8f0; border-radius: 0 12px 12px 12px; }
.host-bubble { background-color: #fffbeb; border-color: #fde68a; }
";
