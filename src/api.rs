// src/api.rs
use crate::auth::{with_auth, AuthenticatedUser};
use crate::db::{new_holding_id, HoldingStore};
use crate::error::{handle_rejection, AppError};
use crate::models::{CreateHoldingInput, UpdateHoldingInput};
use crate::quotes::QuoteSource;
use crate::valuation::{summarize, valuate};
use log::{error, info};
use serde_json::json;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Routes plus the JSON error mapping.
pub fn app(
    store: Arc<dyn HoldingStore>,
    quotes: Arc<dyn QuoteSource>,
    jwt_secret: Arc<String>,
) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
    routes(store, quotes, jwt_secret).recover(handle_rejection)
}

pub fn routes(
    store: Arc<dyn HoldingStore>,
    quotes: Arc<dyn QuoteSource>,
    jwt_secret: Arc<String>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let auth = with_auth(jwt_secret, store.clone());

    let status = warp::path!("status").and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }))
    });

    let me = warp::path!("me")
        .and(warp::get())
        .and(auth.clone())
        .map(|caller: AuthenticatedUser| warp::reply::json(&caller.user));

    let brokerages = warp::path!("brokerages")
        .and(warp::get())
        .and(auth.clone())
        .and(with_store(store.clone()))
        .and_then(list_brokerages_handler);

    let list = warp::path!("holdings")
        .and(warp::get())
        .and(auth.clone())
        .and(with_store(store.clone()))
        .and(with_quotes(quotes.clone()))
        .and_then(list_holdings_handler);

    let summary = warp::path!("holdings" / "summary")
        .and(warp::get())
        .and(auth.clone())
        .and(with_store(store.clone()))
        .and(with_quotes(quotes))
        .and_then(summary_handler);

    let create = warp::path!("holdings")
        .and(warp::post())
        .and(auth.clone())
        .and(with_store(store.clone()))
        .and(json_body())
        .and_then(create_holding_handler);

    let get = warp::path!("holdings" / String)
        .and(warp::get())
        .and(auth.clone())
        .and(with_store(store.clone()))
        .and_then(get_holding_handler);

    let update = warp::path!("holdings" / String)
        .and(warp::put())
        .and(auth.clone())
        .and(with_store(store.clone()))
        .and(json_body())
        .and_then(update_holding_handler);

    let delete = warp::path!("holdings" / String)
        .and(warp::delete())
        .and(auth)
        .and(with_store(store))
        .and_then(delete_holding_handler);

    status
        .or(me)
        .or(brokerages)
        .or(summary)
        .or(list)
        .or(create)
        .or(get)
        .or(update)
        .or(delete)
}

fn with_store(
    store: Arc<dyn HoldingStore>,
) -> impl Filter<Extract = (Arc<dyn HoldingStore>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn with_quotes(
    quotes: Arc<dyn QuoteSource>,
) -> impl Filter<Extract = (Arc<dyn QuoteSource>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || quotes.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn reject(e: impl Into<AppError>) -> Rejection {
    let e = e.into();
    error!("Request failed: {}", e);
    warp::reject::custom(e)
}

async fn list_holdings_handler(
    caller: AuthenticatedUser,
    store: Arc<dyn HoldingStore>,
    quotes: Arc<dyn QuoteSource>,
) -> Result<impl Reply, Rejection> {
    let holdings = store.list_holdings(caller.id()).await.map_err(reject)?;
    let valued = valuate(holdings, quotes.as_ref()).await;
    info!("Valued {} holdings for user {}.", valued.len(), caller.id());
    Ok(warp::reply::json(&valued))
}

async fn summary_handler(
    caller: AuthenticatedUser,
    store: Arc<dyn HoldingStore>,
    quotes: Arc<dyn QuoteSource>,
) -> Result<impl Reply, Rejection> {
    let holdings = store.list_holdings(caller.id()).await.map_err(reject)?;
    let valued = valuate(holdings, quotes.as_ref()).await;
    Ok(warp::reply::json(&summarize(&valued)))
}

async fn create_holding_handler(
    caller: AuthenticatedUser,
    store: Arc<dyn HoldingStore>,
    input: CreateHoldingInput,
) -> Result<impl Reply, Rejection> {
    input.validate().map_err(reject)?;
    let holding = input.into_holding(new_holding_id(), caller.id());

    store.save_holding(&holding).await.map_err(reject)?;
    info!("Holding {} created for user {}.", holding.id, caller.id());
    Ok(warp::reply::with_status(
        warp::reply::json(&holding),
        StatusCode::CREATED,
    ))
}

async fn get_holding_handler(
    id: String,
    caller: AuthenticatedUser,
    store: Arc<dyn HoldingStore>,
) -> Result<impl Reply, Rejection> {
    match store.get_holding(caller.id(), &id).await.map_err(reject)? {
        Some(holding) => Ok(warp::reply::json(&holding)),
        None => Err(warp::reject::custom(AppError::NotFound("Holding"))),
    }
}

async fn update_holding_handler(
    id: String,
    caller: AuthenticatedUser,
    store: Arc<dyn HoldingStore>,
    input: UpdateHoldingInput,
) -> Result<impl Reply, Rejection> {
    let mut holding = store
        .get_holding(caller.id(), &id)
        .await
        .map_err(reject)?
        .ok_or_else(|| warp::reject::custom(AppError::NotFound("Holding")))?;

    input.apply(&mut holding).map_err(reject)?;
    store.save_holding(&holding).await.map_err(reject)?;
    info!("Holding {} updated.", holding.id);
    Ok(warp::reply::json(&holding))
}

async fn delete_holding_handler(
    id: String,
    caller: AuthenticatedUser,
    store: Arc<dyn HoldingStore>,
) -> Result<impl Reply, Rejection> {
    if store
        .get_holding(caller.id(), &id)
        .await
        .map_err(reject)?
        .is_none()
    {
        return Err(warp::reject::custom(AppError::NotFound("Holding")));
    }

    store.delete_holding(caller.id(), &id).await.map_err(reject)?;
    info!("Holding {} deleted.", id);
    Ok(warp::reply::json(
        &json!({ "message": "Holding deleted successfully" }),
    ))
}

async fn list_brokerages_handler(
    _caller: AuthenticatedUser,
    store: Arc<dyn HoldingStore>,
) -> Result<impl Reply, Rejection> {
    let brokerages = store.list_brokerages().await.map_err(reject)?;
    Ok(warp::reply::json(&brokerages))
}
