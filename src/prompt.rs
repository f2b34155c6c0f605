// src/prompt.rs
// Builds the instructions that make one model play the whole room.

use crate::participant::{Participant, SubTopic};

const DEFAULT_SUB_TOPIC: &str = "一般討論";

pub fn build_user_prompt(topic: &str) -> String {
    format!("模擬焦點座談：{}", topic)
}

pub fn build_system_prompt(
    topic: &str,
    participants: &[Participant],
    sub_topics: &[SubTopic],
    rounds: u32,
    moderator: &str,
) -> String {
    // 1. Roster
    let participants_desc = participants
        .iter()
        .map(|p| format!("- {} ({}): {}", p.name, p.role, p.system_prompt))
        .collect::<Vec<_>>()
        .join("\n");

    // 2. Stages (always at least one)
    let stages: Vec<&str> = if sub_topics.is_empty() {
        vec![DEFAULT_SUB_TOPIC]
    } else {
        sub_topics.iter().map(|s| s.content.as_str()).collect()
    };
    let rounds_per_stage = rounds.max(1).div_ceil(stages.len() as u32);

    let stage_plan = stages
        .iter()
        .enumerate()
        .map(|(i, content)| {
            format!(
                "階段 {}：\n\
                1. [{m}]: 開場介紹子議題「{}」，並邀請大家發言。\n\
                2. (受訪者們進行約 {} 輪的討論，確保觀點衝突)。\n\
                3. [{m}]: 針對剛剛的討論做簡短總結，並為這個子議題收尾。\n",
                i + 1,
                content,
                rounds_per_stage,
                m = moderator,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    // 3. Full instruction with the strict line format
    format!(
        "你是一個焦點座談模擬器。\n\
        討論主題：{topic}\n\n\
        參與者名單：\n\
        {participants}\n\n\
        【你的任務】：\n\
        請模擬一場包含「{m}」與「受訪者」的完整座談會。\n\
        你必須一人分飾多角，包含一位專業的【{m}】。\n\n\
        【劇本流程要求】：\n\
        請依照以下順序進行模擬 (總共 {stage_count} 個階段)：\n\n\
        {plan}\n\
        最後：\n\
        [{m}]: 感謝大家參與，做全場總結。\n\n\
        【嚴格格式規則】：\n\
        1. 每一句發言都要換行。\n\
        2. 格式必須是： [角色名]: 內容\n   \
        (例如： [{m}]: 大家好...)\n\
        3. 請勿使用 Markdown 的 **加粗** 或標題語法，只要純文字。\n\
        4. {m}的名字請統一使用「{m}」。\n",
        topic = topic,
        participants = participants_desc,
        m = moderator,
        stage_count = stages.len(),
        plan = stage_plan,
    )
}
