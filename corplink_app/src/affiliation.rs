use corplink_core::{Affiliation, Alliance, CharacterId, Corporation};
use corplink_sso::AffiliationClient;

/// Walk character -> corporation -> alliance, keeping whatever resolves.
/// Affiliation is cosmetic next to the token exchange, so failures only warn.
pub(crate) async fn resolve_affiliation<A>(client: &A, character_id: CharacterId) -> Affiliation
where
    A: AffiliationClient,
{
    let corporation_id = match client.character_corporation(character_id).await {
        Ok(id) => id,
        Err(err) => {
            log::warn!("corporation lookup for character {character_id} failed: {err}");
            return Affiliation::default();
        }
    };

    let corporation = match client.corporation(corporation_id).await {
        Ok(info) => info,
        Err(err) => {
            log::warn!("corporation {corporation_id} lookup failed: {err}");
            return Affiliation::default();
        }
    };

    let alliance = match corporation.alliance_id {
        None => None,
        Some(alliance_id) => match client.alliance(alliance_id).await {
            Ok(info) => Some(Alliance {
                id: alliance_id,
                name: info.name,
                ticker: info.ticker,
            }),
            Err(err) => {
                log::warn!("alliance {alliance_id} lookup failed: {err}");
                None
            }
        },
    };

    Affiliation {
        corporation: Some(Corporation {
            id: corporation_id,
            name: corporation.name,
            ticker: corporation.ticker,
        }),
        alliance,
    }
}
