//! Approval workflow over WebSocket
//!
//! A reviewer connects to one campaign awaiting approval, receives each
//! channel draft with a preview of the assigned contacts, and walks through
//! approve / edit / regenerate actions. When every channel is approved the
//! campaign moves to APPROVED and dispatch starts.

use std::collections::BTreeSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use outreach_common::events::CampaignEvent;
use outreach_common::models::{Campaign, Channel, GeneratedContent, PipelineState};

use crate::db;
use crate::pipeline;
use crate::services::dispatch;
use crate::AppState;

/// Contact emails shown per channel draft
const MAX_PREVIEW_CONTACTS: usize = 20;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws/campaigns/:id/approval", get(approval_socket))
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ServerMessage {
    ApprovalStart {
        campaign_id: Uuid,
        channels: Vec<Channel>,
    },
    ChannelGroupStart {
        channel: Channel,
        contact_count: usize,
    },
    ChannelContent {
        channel: Channel,
        content: serde_json::Value,
        contacts: Vec<String>,
        total_contacts: usize,
    },
    ChannelApproved {
        channel: Channel,
        remaining: Vec<Channel>,
    },
    AllApproved {},
    ContentUpdated {
        channel: Channel,
        content: serde_json::Value,
    },
    Regenerating {
        channel: Channel,
    },
    RegenerateFailed {
        channel: Channel,
        message: String,
    },
    CampaignApproved {
        campaign_id: Uuid,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

/// Action parsed from a client text frame
#[derive(Debug, PartialEq)]
pub(crate) enum ClientAction {
    Approve(Channel),
    ApproveAll,
    Edit(Channel, serde_json::Value),
    Regenerate(Channel),
}

/// Parse a client frame. The error tuple maps straight onto the ERROR
/// message: UNKNOWN_ACTION for unrecognized actions, BAD_REQUEST for
/// everything malformed.
pub(crate) fn parse_client_message(
    text: &str,
) -> Result<ClientAction, (&'static str, String)> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ("BAD_REQUEST", format!("invalid JSON: {}", e)))?;
    let action = value
        .get("action")
        .and_then(|v| v.as_str())
        .ok_or(("BAD_REQUEST", "missing action field".to_string()))?;

    let channel = || -> Result<Channel, (&'static str, String)> {
        let name = value
            .get("channel")
            .and_then(|v| v.as_str())
            .ok_or(("BAD_REQUEST", "missing channel field".to_string()))?;
        Channel::parse(name).map_err(|_| ("BAD_REQUEST", format!("unknown channel: {}", name)))
    };

    match action {
        "approve" => Ok(ClientAction::Approve(channel()?)),
        "approve_all" => Ok(ClientAction::ApproveAll),
        "edit" => {
            let content = value
                .get("content")
                .cloned()
                .ok_or(("BAD_REQUEST", "missing content field".to_string()))?;
            Ok(ClientAction::Edit(channel()?, content))
        }
        "regenerate" => Ok(ClientAction::Regenerate(channel()?)),
        other => Err(("UNKNOWN_ACTION", format!("unknown action: {}", other))),
    }
}

async fn approval_socket(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_session(state, id, socket))
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize approval message");
            false
        }
    }
}

async fn handle_session(state: AppState, campaign_id: Uuid, mut socket: WebSocket) {
    let campaign = match db::campaigns::get_campaign(&state.db, campaign_id).await {
        Ok(Some(campaign)) => campaign,
        Ok(None) => {
            send(
                &mut socket,
                &ServerMessage::Error {
                    code: "NOT_FOUND",
                    message: format!("campaign {}", campaign_id),
                },
            )
            .await;
            return;
        }
        Err(err) => {
            send(
                &mut socket,
                &ServerMessage::Error {
                    code: "INTERNAL_ERROR",
                    message: err.to_string(),
                },
            )
            .await;
            return;
        }
    };

    if campaign.pipeline_state != PipelineState::AwaitingApproval {
        send(
            &mut socket,
            &ServerMessage::Error {
                code: "INVALID_STATE",
                message: format!(
                    "campaign is {}, expected AWAITING_APPROVAL",
                    campaign.pipeline_state
                ),
            },
        )
        .await;
        return;
    }
    let Some(content) = campaign.generated_content.clone() else {
        send(
            &mut socket,
            &ServerMessage::Error {
                code: "INVALID_STATE",
                message: "campaign has no generated content".to_string(),
            },
        )
        .await;
        return;
    };

    if let Err(err) = run_review(state, campaign, content, &mut socket).await {
        tracing::warn!(%campaign_id, error = %err, "Approval session ended with error");
    }
}

async fn run_review(
    state: AppState,
    mut campaign: Campaign,
    mut content: GeneratedContent,
    socket: &mut WebSocket,
) -> outreach_common::Result<()> {
    let campaign_id = campaign.id;
    let channels = content.channels();
    let mut approved: BTreeSet<Channel> = BTreeSet::new();

    if !send(
        socket,
        &ServerMessage::ApprovalStart {
            campaign_id,
            channels: channels.clone(),
        },
    )
    .await
    {
        return Ok(());
    }

    for channel in &channels {
        let assigned = content.contacts_for(*channel);
        send(
            socket,
            &ServerMessage::ChannelGroupStart {
                channel: *channel,
                contact_count: assigned.len(),
            },
        )
        .await;
        send_channel_content(socket, &content, *channel).await;
    }

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };

        let action = match parse_client_message(&text) {
            Ok(action) => action,
            Err((code, message)) => {
                send(socket, &ServerMessage::Error { code, message }).await;
                continue;
            }
        };

        match action {
            ClientAction::Approve(channel) => {
                if !channels.contains(&channel) {
                    send(
                        socket,
                        &ServerMessage::Error {
                            code: "BAD_REQUEST",
                            message: format!("campaign has no {} draft", channel),
                        },
                    )
                    .await;
                    continue;
                }
                approve_channel(&state, campaign_id, channel, &channels, &mut approved, socket)
                    .await;
            }
            ClientAction::ApproveAll => {
                for channel in channels.clone() {
                    if !approved.contains(&channel) {
                        approve_channel(
                            &state,
                            campaign_id,
                            channel,
                            &channels,
                            &mut approved,
                            socket,
                        )
                        .await;
                    }
                }
            }
            ClientAction::Edit(channel, new_content) => {
                if !channels.contains(&channel) {
                    send(
                        socket,
                        &ServerMessage::Error {
                            code: "BAD_REQUEST",
                            message: format!("campaign has no {} draft", channel),
                        },
                    )
                    .await;
                    continue;
                }
                content.common.insert(channel, new_content.clone());
                db::campaigns::update_content(&state.db, campaign_id, &content).await?;
                // An edited draft needs approval again
                approved.remove(&channel);
                state.event_bus.emit_lossy(CampaignEvent::ContentUpdated {
                    campaign_id,
                    channel,
                    timestamp: Utc::now(),
                });
                send(
                    socket,
                    &ServerMessage::ContentUpdated {
                        channel,
                        content: new_content,
                    },
                )
                .await;
            }
            ClientAction::Regenerate(channel) => {
                if !channels.contains(&channel) {
                    send(
                        socket,
                        &ServerMessage::Error {
                            code: "BAD_REQUEST",
                            message: format!("campaign has no {} draft", channel),
                        },
                    )
                    .await;
                    continue;
                }
                send(socket, &ServerMessage::Regenerating { channel }).await;
                match pipeline::content::regenerate(&state, &campaign, channel).await {
                    Ok(template) => {
                        content.common.insert(channel, template.clone());
                        db::campaigns::update_content(&state.db, campaign_id, &content).await?;
                        approved.remove(&channel);
                        state.event_bus.emit_lossy(CampaignEvent::ContentUpdated {
                            campaign_id,
                            channel,
                            timestamp: Utc::now(),
                        });
                        send(
                            socket,
                            &ServerMessage::ContentUpdated {
                                channel,
                                content: template,
                            },
                        )
                        .await;
                    }
                    Err(err) => {
                        tracing::warn!(%campaign_id, %channel, error = %err, "Regeneration failed");
                        send(
                            socket,
                            &ServerMessage::RegenerateFailed {
                                channel,
                                message: err.to_string(),
                            },
                        )
                        .await;
                    }
                }
            }
        }

        if approved.len() == channels.len() {
            send(socket, &ServerMessage::AllApproved {}).await;
            pipeline::advance(&state, &mut campaign, PipelineState::Approved, "approval").await?;
            state.event_bus.emit_lossy(CampaignEvent::CampaignApproved {
                campaign_id,
                timestamp: Utc::now(),
            });
            send(socket, &ServerMessage::CampaignApproved { campaign_id }).await;
            tokio::spawn(dispatch::run_dispatch(state.clone(), campaign_id));
            break;
        }
    }
    Ok(())
}

async fn send_channel_content(socket: &mut WebSocket, content: &GeneratedContent, channel: Channel) {
    let assigned = content.contacts_for(channel);
    let total_contacts = assigned.len();
    let contacts: Vec<String> = assigned.into_iter().take(MAX_PREVIEW_CONTACTS).collect();
    let template = content.common.get(&channel).cloned().unwrap_or_default();
    send(
        socket,
        &ServerMessage::ChannelContent {
            channel,
            content: template,
            contacts,
            total_contacts,
        },
    )
    .await;
}

async fn approve_channel(
    state: &AppState,
    campaign_id: Uuid,
    channel: Channel,
    channels: &[Channel],
    approved: &mut BTreeSet<Channel>,
    socket: &mut WebSocket,
) {
    approved.insert(channel);
    state.event_bus.emit_lossy(CampaignEvent::ChannelApproved {
        campaign_id,
        channel,
        timestamp: Utc::now(),
    });
    let remaining: Vec<Channel> = channels
        .iter()
        .filter(|c| !approved.contains(c))
        .copied()
        .collect();
    send(socket, &ServerMessage::ChannelApproved { channel, remaining }).await;
}
