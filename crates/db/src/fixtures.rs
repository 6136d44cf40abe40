//! Demo catalog used by `mystyle seed` and by integration tests.

use serde::Serialize;
use tracing::info;

use mystyle_core::{Item, ItemId, ItemRepository, RepositoryError};

use crate::repositories::db_error;
use crate::DbPool;

const NO_IMAGE: &str = "/static/images/no_image.png";

struct DemoItem {
    id: &'static str,
    name: &'static str,
    category: &'static str,
    price: i64,
    style: &'static str,
    description: Option<&'static str>,
    listing: u64,
}

const DEMO_ITEMS: &[DemoItem] = &[
    DemoItem {
        id: "french-cardigan",
        name: "カーディガン",
        category: "カーディガン",
        price: 4180,
        style: "フレンチガーリー",
        description: Some("羽織りやすい薄手のカーデ"),
        listing: 156_706_254,
    },
    DemoItem {
        id: "french-ribbon-blouse",
        name: "リボンブラウス",
        category: "ブラウス",
        price: 5000,
        style: "フレンチガーリー",
        description: None,
        listing: 157_892_892,
    },
    DemoItem {
        id: "french-floral-skirt",
        name: "小花柄スカート",
        category: "スカート",
        price: 4490,
        style: "フレンチガーリー",
        description: Some("エアリーなシフォン素材"),
        listing: 149_563_173,
    },
    DemoItem {
        id: "jirai-platform-boots",
        name: "厚底ブーツ",
        category: "ブーツ",
        price: 6518,
        style: "地雷系",
        description: None,
        listing: 158_935_282,
    },
    DemoItem {
        id: "subcul-sweat",
        name: "スウェット",
        category: "スウェット",
        price: 13_970,
        style: "サブカル系",
        description: None,
        listing: 160_622_545,
    },
    DemoItem {
        id: "subcul-leg-warmer",
        name: "レッグウォーマー",
        category: "レッグウォーマー",
        price: 2900,
        style: "サブカル系",
        description: Some("重ね履きでレイヤードを楽しめる"),
        listing: 150_456_070,
    },
    DemoItem {
        id: "ryosan-onepiece",
        name: "量産ワンピース",
        category: "ワンピース",
        price: 10_990,
        style: "量産型",
        description: None,
        listing: 149_817_894,
    },
    DemoItem {
        id: "street-oversized-hoodie",
        name: "オーバーサイズパーカー",
        category: "パーカー",
        price: 6600,
        style: "ストリート系",
        description: Some("撥水加工のナイロン切り替え"),
        listing: 128_611_533,
    },
    DemoItem {
        id: "street-cargo-pants",
        name: "カーゴパンツ",
        category: "パンツ",
        price: 6219,
        style: "ストリート系",
        description: None,
        listing: 131_053_052,
    },
    DemoItem {
        id: "street-graphic-tee",
        name: "グラフィックT",
        category: "Tシャツ",
        price: 3450,
        style: "ストリート系",
        description: Some("メッシュ切り替えで通気性の良い一枚"),
        listing: 133_981_311,
    },
    DemoItem {
        id: "y2k-crop-top",
        name: "クロップドトップス",
        category: "トップス",
        price: 4950,
        style: "Y2K",
        description: None,
        listing: 143_631_556,
    },
    DemoItem {
        id: "y2k-shoulder-bag",
        name: "ショルダーバッグ",
        category: "バッグ",
        price: 5280,
        style: "Y2K",
        description: None,
        listing: 149_189_923,
    },
    DemoItem {
        id: "rock-blouson",
        name: "ブルゾン",
        category: "ブルゾン",
        price: 5990,
        style: "ロック系",
        description: Some("防風素材のショート丈アウター"),
        listing: 128_555_163,
    },
    DemoItem {
        id: "rock-band-tee",
        name: "バンドTシャツ",
        category: "Tシャツ",
        price: 7990,
        style: "ロック系",
        description: None,
        listing: 148_381_520,
    },
    DemoItem {
        id: "basic-rain-coat",
        name: "レインコート",
        category: "コート",
        price: 8800,
        style: "ベーシック",
        description: Some("防水のロング丈コート"),
        listing: 153_219_106,
    },
    DemoItem {
        id: "basic-linen-shirt",
        name: "リネンシャツ",
        category: "シャツ",
        price: 5940,
        style: "ベーシック",
        description: None,
        listing: 147_834_413,
    },
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub items_seeded: Vec<ItemId>,
    pub reset: bool,
}

/// Catalog items with stable ids, in catalog order.
pub fn demo_catalog() -> Vec<Item> {
    DEMO_ITEMS
        .iter()
        .map(|demo| {
            let mut item = Item::new(demo.id, demo.name);
            item.category = Some(demo.category.to_string());
            item.price = Some(demo.price);
            item.styles = vec![demo.style.to_string()];
            item.description = demo.description.map(str::to_string);
            item.image_url = Some(NO_IMAGE.to_string());
            item.shop_url = Some(format!("https://zozo.jp/?c=gr&did={}", demo.listing));
            item
        })
        .collect()
}

/// Saves the demo catalog. Existing rows keep their events and scores.
pub async fn seed_demo_catalog(
    items: &dyn ItemRepository,
) -> Result<SeedResult, RepositoryError> {
    let mut items_seeded = Vec::with_capacity(DEMO_ITEMS.len());
    for item in demo_catalog() {
        items_seeded.push(item.id.clone());
        items.save(item).await?;
    }

    info!(
        event_name = "fixtures.demo_catalog.seeded",
        items = items_seeded.len(),
        "demo catalog seeded"
    );
    Ok(SeedResult { items_seeded, reset: false })
}

/// Removes every catalog item together with its event buckets.
pub async fn clear_catalog(pool: &DbPool) -> Result<u64, RepositoryError> {
    let deleted = sqlx::query("DELETE FROM items").execute(pool).await.map_err(db_error)?;
    Ok(deleted.rows_affected())
}
