use axum::{
    debug_handler,
    extract::{
        ws::Message,
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use crate::{appresult::PokerError, db, model::RoomId, AppError, AppResult};

use super::{
    actions::{self, Joined},
    hub::Hub,
    msg::{Broadcast, ClientEvent, ServerEvent},
};

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    Path(room_id): Path<RoomId>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        debug!(%room_id, "socket opened");
        let (sender, receiver) = stream.split();
        serve(sender, receiver, db_pool, hub, room_id).await;
        debug!(%room_id, "socket closed");
    })
}

fn error_frame(err: &AppError) -> Broadcast {
    Broadcast {
        seq: 0,
        event: ServerEvent::Error {
            kind: err.kind(),
            message: err.public_message(),
        },
    }
}

fn encode(broadcast: &Broadcast) -> Option<Message> {
    match serde_json::to_string(broadcast) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(err) => {
            warn!(?err, "failed to encode broadcast");
            None
        }
    }
}

/// Reads frames until one decodes to a client event. `None` once the socket is closed.
async fn next_event<R, E>(receiver: &mut R) -> Option<AppResult<ClientEvent>>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                return Some(
                    serde_json::from_slice::<ClientEvent>(&msg.into_data())
                        .map_err(|err| PokerError::Invalid(format!("malformed event: {err}")).into()),
                );
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Runs one room socket: handshake, snapshot, then events both ways until either side stops.
async fn serve<S, R, E>(mut sender: S, mut receiver: R, db_pool: SqlitePool, hub: Hub, room_id: RoomId)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let handshake = match next_event(&mut receiver).await {
        Some(Ok(ClientEvent::RoomJoin {
            room_id: join_room,
            user_token,
        })) if join_room == room_id => actions::join(&db_pool, &hub, room_id, &user_token).await,
        Some(Ok(_)) => Err(PokerError::Invalid("expected room:join for this room".to_owned()).into()),
        Some(Err(err)) => Err(err),
        None => return,
    };

    let Joined {
        member,
        channel,
        mut rx,
        snapshot,
    } = match handshake {
        Ok(joined) => joined,
        Err(err) => {
            warn!(%room_id, error = %err.0, "room handshake failed");
            if let Some(frame) = encode(&error_frame(&err)) {
                let _ = sender.send(frame).await;
            }
            let _ = sender.close().await;
            return;
        }
    };

    let first = Broadcast {
        seq: snapshot.seq,
        event: ServerEvent::RoomSnapshot(snapshot),
    };
    if let Some(frame) = encode(&first) {
        if sender.send(frame).await.is_err() {
            drop(rx);
            actions::leave(&hub, &channel, &member);
            return;
        }
    }

    // errors go to this socket only
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Broadcast>();

    let forward_pool = db_pool.clone();
    let forward_channel = channel.clone();
    let mut forward_task = tokio::spawn(async move {
        loop {
            let broadcast = tokio::select! {
                received = rx.recv() => match received {
                    Ok(broadcast) => broadcast,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(%room_id, missed, "subscriber lagged, resending snapshot");
                        match db::snapshot(&forward_pool, room_id, forward_channel.seq()).await {
                            Ok(Some(snapshot)) => Broadcast {
                                seq: snapshot.seq,
                                event: ServerEvent::RoomSnapshot(snapshot),
                            },
                            _ => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };

            let closing = matches!(broadcast.event, ServerEvent::RoomClosed { .. });
            let Some(frame) = encode(&broadcast) else {
                continue;
            };
            if sender.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    let mut forward_finished = false;
    loop {
        let event = tokio::select! {
            event = next_event(&mut receiver) => event,
            _ = &mut forward_task => {
                forward_finished = true;
                break;
            }
        };

        let result = match event {
            None | Some(Ok(ClientEvent::RoomLeave {})) => break,
            Some(Ok(event)) => actions::handle(&db_pool, &channel, &member, event).await,
            Some(Err(err)) => Err(err),
        };

        if let Err(err) = result {
            info!(%room_id, user_id = %member.user.id, error = %err.0, "room event rejected");
            let _ = reply_tx.send(error_frame(&err));
        }
    }

    if !forward_finished {
        forward_task.abort();
        // the forwarder owns the receiver; it must be gone before the hub counts listeners
        let _ = forward_task.await;
    }
    actions::leave(&hub, &channel, &member);
}
