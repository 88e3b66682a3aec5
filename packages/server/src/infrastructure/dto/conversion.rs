//! Conversion logic between domain read models and HTTP DTOs.

use consia_shared::time::timestamp_to_rfc3339;

use crate::{
    domain::{MemberInfo, RoomSnapshot, UsageKey, UsageRecord},
    infrastructure::dto::http as dto,
};

// ========================================
// Domain → DTO
// ========================================

impl From<&RoomSnapshot> for dto::RoomSummaryDto {
    fn from(snapshot: &RoomSnapshot) -> Self {
        Self {
            room: snapshot.room.as_str().to_string(),
            member_count: snapshot.member_count,
            created_at: timestamp_to_rfc3339(snapshot.created_at.value()),
            uptime_ms: snapshot.uptime_ms,
        }
    }
}

impl From<MemberInfo> for dto::MemberDetailDto {
    fn from(member: MemberInfo) -> Self {
        Self {
            connection_id: member.connection_id.into_string(),
            identity: member.identity.as_str().to_string(),
            joined_at: timestamp_to_rfc3339(member.joined_at.value()),
        }
    }
}

impl From<RoomSnapshot> for dto::RoomDetailDto {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            room: snapshot.room.as_str().to_string(),
            member_count: snapshot.member_count,
            created_at: timestamp_to_rfc3339(snapshot.created_at.value()),
            uptime_ms: snapshot.uptime_ms,
            members: snapshot.members.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<(&UsageKey, &UsageRecord)> for dto::UsageRowDto {
    fn from((key, record): (&UsageKey, &UsageRecord)) -> Self {
        Self {
            identity: key.identity.clone(),
            plan: key.plan.as_str().to_string(),
            requests: record.requests,
            ai_calls: record.ai_calls,
            voice_sessions: record.voice_sessions,
            tts_chars: record.tts_chars,
            spend: record.spend.as_units(),
        }
    }
}
