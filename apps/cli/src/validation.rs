//! 输入验证模块
//!
//! 解析通道列表、百分比等命令行输入

use anyhow::{Context, Result};

/// 解析通道列表
///
/// 支持的格式：
/// - `3`：单个通道
/// - `0,3,5`：逗号分隔
/// - `6-11`：闭区间
/// - `all`：所有通道
///
/// 结果按升序去重。
pub fn parse_channels(list: &str, channel_count: usize) -> Result<Vec<usize>> {
    let list = list.trim();
    if list.eq_ignore_ascii_case("all") {
        return Ok((0..channel_count).collect());
    }

    let mut channels = Vec::new();
    for part in list.split(',').map(str::trim) {
        if part.is_empty() {
            anyhow::bail!("通道列表中有空项: {:?}", list);
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_channel(start, channel_count)?;
                let end = parse_channel(end, channel_count)?;
                if start > end {
                    anyhow::bail!("通道区间 {} 起点大于终点", part);
                }
                channels.extend(start..=end);
            },
            None => channels.push(parse_channel(part, channel_count)?),
        }
    }

    channels.sort_unstable();
    channels.dedup();
    Ok(channels)
}

fn parse_channel(text: &str, channel_count: usize) -> Result<usize> {
    let channel: usize = text
        .trim()
        .parse()
        .with_context(|| format!("无效的通道号: {:?}", text))?;
    if channel >= channel_count {
        anyhow::bail!("通道 {} 超出范围（共 {} 个通道）", channel, channel_count);
    }
    Ok(channel)
}

/// 验证百分比（0..=100）
pub fn validate_percent(pct: u32) -> Result<u32> {
    if pct > 100 {
        anyhow::bail!("百分比 {} 超出范围 [0, 100]", pct);
    }
    Ok(pct)
}

/// 验证扫描速度倍率（有限正数）
pub fn validate_speed(speed: f64) -> Result<f64> {
    if !speed.is_finite() || speed <= 0.0 {
        anyhow::bail!("速度倍率必须是正数: {}", speed);
    }
    Ok(speed)
}
