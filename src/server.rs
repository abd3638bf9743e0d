//! HTTP surface for the map front end. Reads go through the selectors,
//! writes through `Editor`. Failures come back as `{ "message": ... }`.

use crate::editor::{Editor, EditorError};
use crate::forms::{FieldError, LineForm, StopForm};
use crate::map_style;
use crate::selectors;
use crate::transit_types::{StopFilter, TransitLine, VisualizationProperty};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

#[derive(Serialize)]
struct ErrorReply<'a> {
    message: String,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    fields: &'a [FieldError],
}

#[derive(Deserialize)]
struct CreateLineRequest {
    #[serde(default)]
    id: String,
    #[serde(default)]
    stops: Vec<StopForm>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionRequest {
    #[serde(default)]
    stop_id: Option<String>,
}

#[derive(Deserialize)]
struct VisualizationRequest {
    property: VisualizationProperty,
}

#[derive(Serialize)]
struct FilterReply {
    filter: StopFilter,
    visible: usize,
}

fn message_reply(status: StatusCode, message: String, fields: &[FieldError]) -> Response {
    warp::reply::with_status(warp::reply::json(&ErrorReply { message, fields }), status).into_response()
}

fn respond<T: Serialize>(result: Result<T, EditorError>) -> Response {
    match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            message_reply(status, e.to_string(), e.field_errors())
        }
    }
}

fn no_content(result: Result<(), EditorError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "An error occurred".to_string())
    };
    Ok(message_reply(status, message, &[]))
}

fn with_editor(editor: Arc<Editor>) -> impl Filter<Extract = (Arc<Editor>,), Error = Infallible> + Clone {
    warp::any().map(move || editor.clone())
}

pub fn routes(editor: Arc<Editor>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone + Send + Sync + 'static {
    let editor = with_editor(editor);

    // GET /health
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })).into_response());

    // GET /lines
    let list_lines = warp::path!("lines")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            let lines: Vec<TransitLine> = editor
                .read(|s| selectors::select_all(s).into_iter().cloned().collect())
                .await;
            warp::reply::json(&lines).into_response()
        });

    // POST /lines
    let create_line = warp::path!("lines")
        .and(warp::post())
        .and(warp::body::json())
        .and(editor.clone())
        .then(|body: CreateLineRequest, editor: Arc<Editor>| async move {
            let form = LineForm { id: body.id };
            match editor.create_line(&form, &body.stops).await {
                Ok(line) => warp::reply::with_status(warp::reply::json(&line), StatusCode::CREATED).into_response(),
                Err(e) => respond::<()>(Err(e)),
            }
        });

    // DELETE /lines/:id
    let delete_line = warp::path!("lines" / String)
        .and(warp::delete())
        .and(editor.clone())
        .then(|id: String, editor: Arc<Editor>| async move { no_content(editor.delete_line(&id).await) });

    // POST /lines/:id/stops
    let add_stop = warp::path!("lines" / String / "stops")
        .and(warp::post())
        .and(warp::body::json())
        .and(editor.clone())
        .then(|line_id: String, form: StopForm, editor: Arc<Editor>| async move {
            respond(editor.add_stop(&line_id, &form).await)
        });

    // PATCH /lines/:id/stops/:stop_id
    let edit_stop = warp::path!("lines" / String / "stops" / String)
        .and(warp::patch())
        .and(warp::body::json())
        .and(editor.clone())
        .then(|line_id: String, stop_id: String, form: StopForm, editor: Arc<Editor>| async move {
            respond(editor.edit_stop(&line_id, &stop_id, &form).await)
        });

    // DELETE /lines/:id/stops/:stop_id
    let remove_stop = warp::path!("lines" / String / "stops" / String)
        .and(warp::delete())
        .and(editor.clone())
        .then(|line_id: String, stop_id: String, editor: Arc<Editor>| async move {
            respond(editor.remove_stop(&line_id, &stop_id).await)
        });

    let lines = list_lines
        .or(create_line)
        .unify()
        .or(delete_line)
        .unify()
        .or(add_stop)
        .unify()
        .or(edit_stop)
        .unify()
        .or(remove_stop)
        .unify()
        .boxed();

    // GET /sources/stops
    let stops_source = warp::path!("sources" / "stops")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            warp::reply::json(&editor.read(selectors::stops_point_source).await).into_response()
        });

    // GET /sources/stops/plain
    let plain_stops_source = warp::path!("sources" / "stops" / "plain")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            warp::reply::json(&editor.read(selectors::stops_source).await).into_response()
        });

    // GET /sources/lines
    let lines_source = warp::path!("sources" / "lines")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            warp::reply::json(&editor.read(selectors::lines_source).await).into_response()
        });

    // GET /bounds
    let bounds = warp::path!("bounds")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            warp::reply::json(&editor.read(selectors::bounds).await).into_response()
        });

    // GET /style/layers
    let layers = warp::path!("style" / "layers")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            let property = editor.read(|s| s.visualization_property).await;
            warp::reply::json(&map_style::layers(property)).into_response()
        });

    let map = stops_source
        .or(plain_stops_source)
        .unify()
        .or(lines_source)
        .unify()
        .or(bounds)
        .unify()
        .or(layers)
        .unify()
        .boxed();

    // GET /selection
    let get_selection = warp::path!("selection")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            warp::reply::json(&editor.read(selectors::stop_detail).await).into_response()
        });

    // PUT /selection
    let put_selection = warp::path!("selection")
        .and(warp::put())
        .and(warp::body::json())
        .and(editor.clone())
        .then(|body: SelectionRequest, editor: Arc<Editor>| async move {
            match editor.select_stop(body.stop_id).await {
                Ok(()) => warp::reply::json(&editor.read(selectors::stop_detail).await).into_response(),
                Err(e) => respond::<()>(Err(e)),
            }
        });

    // PUT /visualization
    let put_visualization = warp::path!("visualization")
        .and(warp::put())
        .and(warp::body::json())
        .and(editor.clone())
        .then(|body: VisualizationRequest, editor: Arc<Editor>| async move {
            editor.set_visualization(body.property).await;
            let property = editor.read(|s| s.visualization_property).await;
            warp::reply::json(&map_style::layers(property)).into_response()
        });

    // GET /filter
    let get_filter = warp::path!("filter")
        .and(warp::get())
        .and(editor.clone())
        .then(|editor: Arc<Editor>| async move {
            let reply = editor
                .read(|s| FilterReply {
                    filter: s.current_filter.clone(),
                    visible: selectors::visible_stops(s).len(),
                })
                .await;
            warp::reply::json(&reply).into_response()
        });

    // PUT /filter
    let put_filter = warp::path!("filter")
        .and(warp::put())
        .and(warp::body::json())
        .and(editor.clone())
        .then(|filter: StopFilter, editor: Arc<Editor>| async move {
            let result = editor.filter_stops(filter).await;
            let filter = editor.read(|s| s.current_filter.clone()).await;
            respond(result.map(|visible| FilterReply { filter, visible }))
        });

    // DELETE /filter
    let clear_filter = warp::path!("filter")
        .and(warp::delete())
        .and(editor)
        .then(|editor: Arc<Editor>| async move {
            editor.clear_filter().await;
            StatusCode::NO_CONTENT.into_response()
        });

    let view = get_selection
        .or(put_selection)
        .unify()
        .or(put_visualization)
        .unify()
        .or(get_filter)
        .unify()
        .or(put_filter)
        .unify()
        .or(clear_filter)
        .unify()
        .boxed();

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"]);

    health
        .or(lines)
        .unify()
        .or(map)
        .unify()
        .or(view)
        .unify()
        .with(cors)
        .with(warp::log("transit_line_editor::http"))
        .recover(handle_rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::test_support::{Harness, harness};
    use crate::transit_types::fixtures;
    use serde_json::{Value, json};
    use warp::test::request;

    async fn setup() -> (impl Filter<Extract = impl Reply, Error = Infallible> + Clone, Harness) {
        let mut line = fixtures::line("u9", &["a", "b"]);
        line.stops[0].people_on = 80;
        line.stops[1].people_on = 20;
        let h = harness(vec![line]).await;
        h.editor.load_lines(None).await.unwrap();
        (routes(h.editor.clone()), h)
    }

    fn body<B: AsRef<[u8]>>(resp: &warp::http::Response<B>) -> Value {
        serde_json::from_slice(resp.body().as_ref()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_lines() {
        let (routes, _h) = setup().await;
        let resp = request().path("/health").reply(&routes).await;
        assert_eq!(body(&resp), json!({ "status": "ok" }));

        let resp = request().path("/lines").reply(&routes).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(body(&resp)[0]["id"], "u9");
    }

    #[tokio::test]
    async fn test_stops_source() {
        let (routes, _h) = setup().await;
        let resp = request().path("/sources/stops").reply(&routes).await;
        let json = body(&resp);
        assert_eq!(json["type"], "geojson");
        assert_eq!(json["data"]["features"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"]["features"][0]["properties"]["_id"], "a");

        let resp = request().path("/sources/lines").reply(&routes).await;
        assert_eq!(body(&resp)["data"]["features"][0]["geometry"]["type"], "LineString");
    }

    #[tokio::test]
    async fn test_add_stop_validation_error() {
        let (routes, h) = setup().await;
        let resp = request()
            .method("POST")
            .path("/lines/u9/stops")
            .json(&json!({ "name": "", "lat": 52.5, "lng": 13.4 }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 400);
        let json = body(&resp);
        assert_eq!(json["message"], "Name is required");
        assert_eq!(json["fields"][0]["field"], "name");
        assert_eq!(h.backend.lock().unwrap()[0].stops.len(), 2);
    }

    #[tokio::test]
    async fn test_add_and_remove_stop() {
        let (routes, h) = setup().await;
        let resp = request()
            .method("POST")
            .path("/lines/u9/stops")
            .json(&json!({ "name": "C", "lat": 52.5, "lng": 13.4, "peopleOn": 1 }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 200);
        let new_id = body(&resp)["stops"][2]["id"].as_str().unwrap().to_string();
        assert_eq!(h.backend.lock().unwrap()[0].stops.len(), 3);

        let resp = request()
            .method("DELETE")
            .path(&format!("/lines/u9/stops/{}", new_id))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 200);
        assert_eq!(body(&resp)["stops"][1]["nextId"], "");
    }

    #[tokio::test]
    async fn test_create_and_delete_line() {
        let (routes, h) = setup().await;
        let resp = request()
            .method("POST")
            .path("/lines")
            .json(&json!({
                "id": "M10",
                "stops": [
                    { "name": "Start", "lat": 52.5, "lng": 13.4 },
                    { "name": "End", "lat": 52.6, "lng": 13.5 }
                ]
            }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 201);
        assert_eq!(body(&resp)["id"], "m10");

        let resp = request().method("DELETE").path("/lines/m10").reply(&routes).await;
        assert_eq!(resp.status(), 204);
        assert_eq!(h.backend.lock().unwrap().len(), 1);

        let resp = request().method("DELETE").path("/lines/m10").reply(&routes).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body(&resp)["message"], "Line m10 not found");
    }

    #[tokio::test]
    async fn test_selection_and_visualization() {
        let (routes, _h) = setup().await;
        let resp = request().path("/selection").reply(&routes).await;
        assert_eq!(body(&resp)["name"], "Please select a stop");

        let resp = request()
            .method("PUT")
            .path("/visualization")
            .json(&json!({ "property": "peopleOn" }))
            .reply(&routes)
            .await;
        assert_eq!(body(&resp)[1]["paint"]["circle-color"][3][3], "#e91e63");

        let resp = request()
            .method("PUT")
            .path("/selection")
            .json(&json!({ "stopId": "b" }))
            .reply(&routes)
            .await;
        let json = body(&resp);
        assert_eq!(json["name"], "Stop b");
        assert_eq!(json["visualization"], json!({ "label": "People getting on", "value": 20 }));
        assert_eq!(json["metrics"][0]["level"], "low");

        let resp = request()
            .method("PUT")
            .path("/selection")
            .json(&json!({ "stopId": "nope" }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_filter_round_trip() {
        let (routes, _h) = setup().await;
        let resp = request()
            .method("PUT")
            .path("/filter")
            .json(&json!({ "peopleOn": 50 }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 200);
        assert_eq!(body(&resp)["visible"], 1);

        let resp = request().path("/bounds").reply(&routes).await;
        assert_eq!(body(&resp), json!([13.4, 52.52, 13.4, 52.52]));

        let resp = request().method("DELETE").path("/filter").reply(&routes).await;
        assert_eq!(resp.status(), 204);
        let resp = request().path("/filter").reply(&routes).await;
        assert_eq!(body(&resp)["visible"], 2);
    }

    #[tokio::test]
    async fn test_bad_body_and_unknown_route() {
        let (routes, _h) = setup().await;
        let resp = request()
            .method("PUT")
            .path("/visualization")
            .json(&json!({ "property": "sparkle" }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 400);
        assert!(body(&resp)["message"].as_str().unwrap().starts_with("Invalid request body"));

        let resp = request().path("/nowhere").reply(&routes).await;
        assert_eq!(resp.status(), 404);
    }
}
