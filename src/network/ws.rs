use super::{ClientMessage, NetworkError, ServerMessage};
use futures::{future, Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use log::debug;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Open the websocket and expose it as typed message halves.
pub async fn ws_connect(
    url: Url,
) -> Result<
    (
        impl Sink<ClientMessage, Error = NetworkError>,
        impl Stream<Item = Result<ServerMessage, NetworkError>>,
    ),
    NetworkError,
> {
    let (ws, _response) = connect_async(url.as_str()).await?;
    let (sink, stream) = ws.split();

    let sink = sink
        .sink_err_into::<NetworkError>()
        .with(|message| future::ready(encode_message(message)));

    let stream = stream
        .err_into::<NetworkError>()
        .try_filter_map(|frame| future::ready(frame_text(frame)))
        .and_then(|json| future::ready(decode_message(&json)));

    Ok((sink, stream))
}

fn encode_message(message: ClientMessage) -> Result<Message, NetworkError> {
    let json = serde_json::to_string(&message)?;
    debug!("sending: {}", json);
    Ok(Message::Text(json))
}

/// Text payload of a frame. Pings, pongs and close frames carry no protocol
/// data and are dropped here; the connection state they signal surfaces
/// through the stream ending instead.
fn frame_text(frame: Message) -> Result<Option<String>, NetworkError> {
    match frame {
        Message::Text(json) => Ok(Some(json)),
        _ => Ok(None),
    }
}

fn decode_message(json: &str) -> Result<ServerMessage, NetworkError> {
    debug!("received: {}", json);
    serde_json::from_str(json).map_err(NetworkError::from)
}
